use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthenticatedSubject, AuthorizationPlugIn, PlugInProperties, SecurityRealmError,
    SubjectSupplemental, Supplemental,
};
use service_graph::{ActivationError, Service, ServiceHandle};

use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::names;
use crate::domain::plugin_loader::PlugInLoader;
use crate::spec::PlugInSpec;

pub struct PlugInAuthorizationService {
    name: String,
    properties: PlugInProperties,
    loader: ServiceHandle<PlugInLoader>,
}

#[async_trait]
impl Service for PlugInAuthorizationService {
    type Value = dyn SubjectSupplemental;

    async fn start(&self) -> Result<Arc<dyn SubjectSupplemental>, ActivationError> {
        let plug_in = self
            .loader
            .get()
            .await?
            .authorization_plugin(&self.name, &self.properties)
            .ok_or_else(|| {
                ActivationError::failed(format!("no authorization plug-in named '{}'", self.name))
            })?;
        Ok(Arc::new(PlugInSubjectSupplemental { plug_in }))
    }
}

pub struct PlugInSubjectSupplemental {
    plug_in: Arc<dyn AuthorizationPlugIn>,
}

#[async_trait]
impl SubjectSupplemental for PlugInSubjectSupplemental {
    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError> {
        let groups = self.plug_in.groups(subject.principal()).await?;
        Ok(Supplemental::from_groups(groups))
    }
}

/// # Errors
///
/// [`DomainError::Expression`] if a property cannot be resolved.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &PlugInSpec,
    loader: &ServiceHandle<PlugInLoader>,
) -> Result<ServiceHandle<dyn SubjectSupplemental>, DomainError> {
    let service = PlugInAuthorizationService {
        name: spec.name.clone(),
        properties: cx.plug_in_properties(spec)?,
        loader: loader.clone(),
    };
    let name = cx.name(names::PLUG_IN_AUTHORIZATION);
    Ok(cx.tx.add_service(name, service).depends_on(loader).install()?)
}
