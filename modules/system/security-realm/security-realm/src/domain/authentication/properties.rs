//! Users and passwords kept in a properties file.
//!
//! Unless `plain-text` is set, each value is the hex MD5 of
//! `username:realm:password`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, CallbackHandler, Credential, SecurityRealmError,
};
use service_graph::{ActivationError, Service};
use tracing::debug;

use super::{RegisteredHandler, password_credential, rejected, secrets_match};
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::files::{ConfiguredFile, parse_properties};
use crate::domain::names;
use crate::spec::PropertiesAuthenticationSpec;

pub struct PropertiesAuthenticationService {
    realm: String,
    file: ConfiguredFile,
    plain_text: bool,
}

#[async_trait]
impl Service for PropertiesAuthenticationService {
    type Value = dyn CallbackHandler;

    async fn start(&self) -> Result<Arc<dyn CallbackHandler>, ActivationError> {
        let (path, text) = self.file.read_to_string().await?;
        let users = parse_properties(&text);
        debug!(path = %path.display(), users = users.len(), "Loaded users file");
        Ok(Arc::new(PropertiesCallbackHandler::new(
            &self.realm,
            users,
            self.plain_text,
        )))
    }
}

pub struct PropertiesCallbackHandler {
    realm: String,
    users: HashMap<String, String>,
    plain_text: bool,
}

impl PropertiesCallbackHandler {
    #[must_use]
    pub fn new(
        realm: &str,
        users: impl IntoIterator<Item = (String, String)>,
        plain_text: bool,
    ) -> Self {
        Self {
            realm: realm.to_owned(),
            users: users.into_iter().collect(),
            plain_text,
        }
    }

    fn matches(&self, stored: &str, username: &str, password: &str) -> bool {
        if self.plain_text {
            secrets_match(stored.as_bytes(), password.as_bytes())
        } else {
            let stored = stored.to_ascii_lowercase();
            secrets_match(stored.as_bytes(), digest(username, &self.realm, password).as_bytes())
        }
    }
}

/// Hex MD5 of `username:realm:password`.
#[must_use]
pub fn digest(username: &str, realm: &str, password: &str) -> String {
    format!("{:x}", md5::compute(format!("{username}:{realm}:{password}")))
}

#[async_trait]
impl CallbackHandler for PropertiesCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Digest
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let (username, password) = password_credential(credential)?;
        match self.users.get(username) {
            Some(stored) if self.matches(stored, username, password.expose_secret()) => {
                Ok(AuthenticatedSubject::new(username, AuthMechanism::Digest))
            }
            _ => Err(rejected(username)),
        }
    }
}

/// Registers the handler; the file is read when the node starts.
///
/// # Errors
///
/// [`DomainError::Resolution`] if the named path is not published.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &PropertiesAuthenticationSpec,
) -> Result<RegisteredHandler, DomainError> {
    let file = cx.file(&spec.file)?;
    let relative_to = file.relative_to().cloned();
    let service = PropertiesAuthenticationService {
        realm: cx.realm.to_owned(),
        file,
        plain_text: spec.plain_text,
    };

    let name = cx.name(names::PROPERTIES_AUTHENTICATION);
    let mut builder = cx.tx.add_service(name, service);
    if let Some(base) = &relative_to {
        builder = builder.depends_on(base);
    }
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::Digest,
        handle: builder.install()?,
    })
}
