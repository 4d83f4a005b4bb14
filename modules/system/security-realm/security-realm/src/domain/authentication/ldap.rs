//! LDAP authentication: find the user's entry, then bind as it.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, CallbackHandler, Credential, LdapConnectionManager,
    LdapSearch, SearchScope, SecurityRealmError,
};
use service_graph::{ActivationError, Service, ServiceHandle};
use tracing::debug;

use super::{RegisteredHandler, password_credential, rejected};
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::ldap_filter::expand;
use crate::domain::names;
use crate::spec::LdapAuthenticationSpec;

#[derive(Clone)]
struct Settings {
    base_dn: String,
    filter: String,
    scope: SearchScope,
    allow_empty_passwords: bool,
    user_dn_attribute: String,
    share_connection: bool,
}

pub struct LdapAuthenticationService {
    settings: Settings,
    manager: ServiceHandle<dyn LdapConnectionManager>,
}

#[async_trait]
impl Service for LdapAuthenticationService {
    type Value = dyn CallbackHandler;

    async fn start(&self) -> Result<Arc<dyn CallbackHandler>, ActivationError> {
        Ok(Arc::new(LdapCallbackHandler {
            settings: self.settings.clone(),
            manager: self.manager.get().await?,
        }))
    }
}

pub struct LdapCallbackHandler {
    settings: Settings,
    manager: Arc<dyn LdapConnectionManager>,
}

#[async_trait]
impl CallbackHandler for LdapCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let (username, password) = password_credential(credential)?;
        let s = &self.settings;
        if password.expose_secret().is_empty() && !s.allow_empty_passwords {
            return Err(rejected(username));
        }

        let connection = self.manager.connect().await?;
        let search = LdapSearch {
            base_dn: s.base_dn.clone(),
            filter: expand(&s.filter, username),
            scope: s.scope,
            attributes: vec![s.user_dn_attribute.clone()],
        };
        let mut entries = connection.search(&search).await?;
        if entries.len() > 1 {
            return Err(SecurityRealmError::Unauthorized(format!(
                "username '{username}' matches more than one entry"
            )));
        }
        let entry = entries.pop().ok_or_else(|| rejected(username))?;
        let user_dn = entry
            .first(&s.user_dn_attribute)
            .unwrap_or(&entry.dn)
            .to_owned();

        // Verifies the password; the bound connection itself is not kept.
        self.manager.bind(&user_dn, password).await?;
        debug!(user = username, dn = %user_dn, "LDAP bind succeeded");

        let subject = AuthenticatedSubject::new(username, AuthMechanism::Plain).with_user_dn(user_dn);
        Ok(if s.share_connection {
            subject.with_ldap_connection(connection)
        } else {
            subject
        })
    }
}

/// Registers the LDAP handler against the named connection manager.
///
/// # Errors
///
/// Returns [`DomainError::Resolution`] if the connection manager is not
/// published.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &LdapAuthenticationSpec,
    share_connection: bool,
) -> Result<RegisteredHandler, DomainError> {
    let manager =
        cx.external::<dyn LdapConnectionManager>(&names::ldap_connection(&spec.connection))?;
    let service = LdapAuthenticationService {
        settings: Settings {
            base_dn: spec.base_dn.clone(),
            filter: spec.user_filter.template(),
            scope: SearchScope::from_recursive(spec.recursive),
            allow_empty_passwords: spec.allow_empty_passwords,
            user_dn_attribute: spec.user_dn.clone(),
            share_connection,
        },
        manager: manager.clone(),
    };

    let name = cx.name(names::LDAP_AUTHENTICATION);
    let handle = cx.tx.add_service(name, service).depends_on(&manager).install()?;
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::Plain,
        handle,
    })
}
