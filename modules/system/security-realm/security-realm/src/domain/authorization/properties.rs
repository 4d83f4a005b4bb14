//! Groups listed per user in a properties file (`user=group1,group2`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthenticatedSubject, SecurityRealmError, SubjectSupplemental, Supplemental,
};
use service_graph::{ActivationError, Service, ServiceHandle};

use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::files::{ConfiguredFile, parse_properties};
use crate::domain::names;
use crate::spec::FileSpec;

pub struct PropertiesAuthorizationService {
    file: ConfiguredFile,
}

#[async_trait]
impl Service for PropertiesAuthorizationService {
    type Value = dyn SubjectSupplemental;

    async fn start(&self) -> Result<Arc<dyn SubjectSupplemental>, ActivationError> {
        let (_, text) = self.file.read_to_string().await?;
        Ok(Arc::new(PropertiesSubjectSupplemental::parse(&text)))
    }
}

pub struct PropertiesSubjectSupplemental {
    groups: HashMap<String, BTreeSet<String>>,
}

impl PropertiesSubjectSupplemental {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let groups = parse_properties(text)
            .into_iter()
            .map(|(user, list)| {
                let set = list
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_owned)
                    .collect();
                (user, set)
            })
            .collect();
        Self { groups }
    }
}

#[async_trait]
impl SubjectSupplemental for PropertiesSubjectSupplemental {
    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError> {
        Ok(self
            .groups
            .get(subject.principal())
            .map_or_else(Supplemental::default, |g| Supplemental::from_groups(g.iter().cloned())))
    }
}

/// # Errors
///
/// [`DomainError::Resolution`] if the named path is not published.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &FileSpec,
) -> Result<ServiceHandle<dyn SubjectSupplemental>, DomainError> {
    let file = cx.file(spec)?;
    let relative_to = file.relative_to().cloned();
    let name = cx.name(names::PROPERTIES_AUTHORIZATION);
    let mut builder = cx.tx.add_service(name, PropertiesAuthorizationService { file });
    if let Some(base) = &relative_to {
        builder = builder.depends_on(base);
    }
    Ok(builder.install()?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_realm_sdk::AuthMechanism;

    use super::*;

    #[tokio::test]
    async fn groups_are_split_on_commas() {
        let supplemental = PropertiesSubjectSupplemental::parse("admin=ops, dev,,ops\nbob=\n");

        let admin = AuthenticatedSubject::new("admin", AuthMechanism::Digest);
        let result = supplemental.supplemental(&admin).await.unwrap();
        assert_eq!(
            result.groups.into_iter().collect::<Vec<_>>(),
            vec!["dev".to_owned(), "ops".to_owned()]
        );

        let bob = AuthenticatedSubject::new("bob", AuthMechanism::Digest);
        assert!(supplemental.supplemental(&bob).await.unwrap().groups.is_empty());

        let ghost = AuthenticatedSubject::new("ghost", AuthMechanism::Digest);
        assert_eq!(supplemental.supplemental(&ghost).await.unwrap(), Supplemental::default());
    }
}
