//! Users listed in the realm definition itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, CallbackHandler, Credential, SecurityRealmError,
};
use service_graph::ValueService;

use super::{RegisteredHandler, password_credential, rejected, secrets_match};
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::names;
use crate::spec::UsersSpec;

/// Holds already resolved passwords; nothing is looked up after
/// construction.
pub struct UsersCallbackHandler {
    users: HashMap<String, SecretString>,
}

impl UsersCallbackHandler {
    #[must_use]
    pub fn new(users: impl IntoIterator<Item = (String, SecretString)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CallbackHandler for UsersCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Digest
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let (username, password) = password_credential(credential)?;
        let accepted = self.users.get(username).is_some_and(|expected| {
            secrets_match(expected.expose_secret().as_bytes(), password.expose_secret().as_bytes())
        });
        if accepted {
            Ok(AuthenticatedSubject::new(username, AuthMechanism::Digest))
        } else {
            Err(rejected(username))
        }
    }
}

/// Resolves every password expression, then registers the handler.
///
/// # Errors
///
/// Returns [`DomainError::Expression`] if a password cannot be resolved.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &UsersSpec,
) -> Result<RegisteredHandler, DomainError> {
    let users = spec
        .users
        .iter()
        .map(|(name, password)| Ok((name.clone(), cx.resolve_secret(password)?)))
        .collect::<Result<HashMap<_, _>, DomainError>>()?;

    let name = cx.name(names::USERS);
    let handler: Arc<dyn CallbackHandler> = Arc::new(UsersCallbackHandler::new(users));
    let handle = cx.tx.add_service(name, ValueService::new(handler)).install()?;
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::Digest,
        handle,
    })
}
