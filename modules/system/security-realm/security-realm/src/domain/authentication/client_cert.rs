//! Certificate fallback: accepts clients whose certificate chain the TLS
//! layer already validated against the realm truststore.

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

pub struct ClientCertCallbackHandler;

#[async_trait]
impl CallbackHandler for ClientCertCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::ClientCert
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        match credential {
            Credential::ClientCertificate { subject_dn } if !subject_dn.is_empty() => Ok(
                AuthenticatedSubject::new(subject_dn.clone(), AuthMechanism::ClientCert)
                    .with_user_dn(subject_dn.clone()),
            ),
            _ => Err(SecurityRealmError::Unauthorized(
                "a client certificate is required".to_owned(),
            )),
        }
    }
}

/// # Errors
///
/// Returns [`DomainError::Resolution`] if the node cannot be registered.
pub fn resolve(cx: &mut BuildContext<'_, '_>) -> Result<RegisteredHandler, DomainError> {
    let name = cx.name(names::CLIENT_CERT);
    let handler: Arc<dyn CallbackHandler> = Arc::new(ClientCertCallbackHandler);
    let handle = cx.tx.add_service(name, ValueService::new(handler)).install()?;
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::ClientCert,
        handle,
    })
}
