//! Local (same-machine) authentication.

use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, CallbackHandler, Credential, SecurityRealmError,
};
use service_graph::ValueService;

use super::RegisteredHandler;
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::names;
use crate::spec::{AllowedUsers, LocalSpec};

/// Lets local callers in as the default user, or as a user they name when
/// that user is allowed.
pub struct LocalCallbackHandler {
    default_user: Option<String>,
    allowed_users: AllowedUsers,
}

impl LocalCallbackHandler {
    #[must_use]
    pub fn new(spec: &LocalSpec) -> Self {
        Self {
            default_user: spec.default_user.clone(),
            allowed_users: spec.allowed_users.clone(),
        }
    }

    fn admit(&self, requested: Option<&str>) -> Result<String, SecurityRealmError> {
        match requested {
            None => self.default_user.clone().ok_or_else(|| {
                SecurityRealmError::Unauthorized("no default local user configured".to_owned())
            }),
            Some(user)
                if self.default_user.as_deref() == Some(user) || self.allowed_users.allows(user) =>
            {
                Ok(user.to_owned())
            }
            Some(user) => Err(SecurityRealmError::Unauthorized(format!(
                "local user '{user}' is not allowed"
            ))),
        }
    }
}

#[async_trait]
impl CallbackHandler for LocalCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Local
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let Credential::Local { username } = credential else {
            return Err(SecurityRealmError::Unauthorized(
                "not a local credential".to_owned(),
            ));
        };
        let principal = self.admit(username.as_deref())?;
        Ok(AuthenticatedSubject::new(principal, AuthMechanism::Local))
    }
}

/// # Errors
///
/// Returns [`DomainError::Resolution`] if the node cannot be registered.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &LocalSpec,
) -> Result<RegisteredHandler, DomainError> {
    let name = cx.name(names::LOCAL);
    let handler: Arc<dyn CallbackHandler> = Arc::new(LocalCallbackHandler::new(spec));
    let handle = cx.tx.add_service(name, ValueService::new(handler)).install()?;
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::Local,
        handle,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn handler(default_user: Option<&str>, allowed: AllowedUsers) -> LocalCallbackHandler {
        LocalCallbackHandler::new(&LocalSpec {
            default_user: default_user.map(str::to_owned),
            allowed_users: allowed,
        })
    }

    #[tokio::test]
    async fn default_user_is_used_when_none_requested() {
        let h = handler(Some("$local"), AllowedUsers::None);
        let subject = h.authenticate(&Credential::local(None)).await.unwrap();
        assert_eq!(subject.principal(), "$local");
        assert_eq!(subject.mechanism(), AuthMechanism::Local);
    }

    #[tokio::test]
    async fn requested_user_must_be_allowed() {
        let h = handler(Some("$local"), AllowedUsers::Listed(["ops".to_owned()].into()));
        assert_eq!(
            h.authenticate(&Credential::local(Some("ops"))).await.unwrap().principal(),
            "ops"
        );
        assert!(h.authenticate(&Credential::local(Some("eve"))).await.is_err());

        let open = handler(None, AllowedUsers::All);
        assert!(open.authenticate(&Credential::local(Some("eve"))).await.is_ok());
        assert!(open.authenticate(&Credential::local(None)).await.is_err());
    }

    #[tokio::test]
    async fn passwords_are_not_local() {
        let h = handler(Some("$local"), AllowedUsers::All);
        assert!(h.authenticate(&Credential::password("a", "b")).await.is_err());
    }
}
