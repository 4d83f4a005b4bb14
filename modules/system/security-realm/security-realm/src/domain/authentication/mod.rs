//! Authentication resolvers: one callback-handler node per configured
//! mechanism.

pub mod client_cert;
pub mod jaas;
pub mod ldap;
pub mod local;
pub mod plugin;
pub mod properties;
pub mod users;

use secrecy::SecretString;
use security_realm_sdk::{AuthMechanism, CallbackHandler, Credential, SecurityRealmError};
use service_graph::{GraphError, ServiceHandle};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::context::BuildContext;
use super::error::DomainError;
use super::names;
use super::plugin_loader::PlugInLoader;
use crate::spec::{AuthenticationSpec, PrimaryMechanism};

/// A callback-handler node and the mechanism it serves, known without
/// activating it.
#[derive(Debug, Clone)]
pub struct RegisteredHandler {
    pub mechanism: AuthMechanism,
    pub handle: ServiceHandle<dyn CallbackHandler>,
}

/// Registers the certificate fallback, the local handler and the primary
/// mechanism, each when configured.
///
/// # Errors
///
/// Returns a [`DomainError`] if a dependency is missing, an expression
/// cannot be resolved or a node cannot be registered.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &AuthenticationSpec,
    share_connection: bool,
    loader: Option<&ServiceHandle<PlugInLoader>>,
) -> Result<Vec<RegisteredHandler>, DomainError> {
    let mut handlers = Vec::new();

    if spec.truststore.is_some() {
        handlers.push(client_cert::resolve(cx)?);
    }
    if let Some(local) = &spec.local {
        handlers.push(local::resolve(cx, local)?);
    }

    if let Some(primary) = &spec.primary {
        debug!(realm = cx.realm, mechanism = primary.kind(), "Resolving authentication");
        let handler = match primary {
            PrimaryMechanism::Jaas(jaas) => jaas::resolve(cx, jaas)?,
            PrimaryMechanism::Ldap(ldap) => ldap::resolve(cx, ldap, share_connection)?,
            PrimaryMechanism::PlugIn(plug_in) => {
                let loader = loader.ok_or_else(|| missing_loader(cx.realm))?;
                plugin::resolve(cx, plug_in, loader)?
            }
            PrimaryMechanism::Properties(props) => properties::resolve(cx, props)?,
            PrimaryMechanism::Users(users) => users::resolve(cx, users)?,
        };
        handlers.push(handler);
    }

    Ok(handlers)
}

pub(crate) fn missing_loader(realm: &str) -> DomainError {
    DomainError::Resolution(GraphError::NotFound(names::child(realm, names::PLUG_IN_LOADER)))
}

/// Username and password of a password credential.
pub(crate) fn password_credential(
    credential: &Credential,
) -> Result<(&str, &SecretString), SecurityRealmError> {
    match credential {
        Credential::Password { username, password } => Ok((username, password)),
        Credential::Local { .. } | Credential::ClientCertificate { .. } => Err(
            SecurityRealmError::Unauthorized("a username and password are required".to_owned()),
        ),
    }
}

pub(crate) fn rejected(username: &str) -> SecurityRealmError {
    SecurityRealmError::Unauthorized(format!("invalid credentials for '{username}'"))
}

/// Compares secrets in time independent of where they differ.
pub(crate) fn secrets_match(stored: &[u8], offered: &[u8]) -> bool {
    stored.ct_eq(offered).unwrap_u8() == 1
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn secrets_match_only_when_identical() {
        assert!(secrets_match(b"s3cret", b"s3cret"));
        assert!(!secrets_match(b"s3cret", b"s3creT"));
        assert!(!secrets_match(b"s3cret", b"s3cret "));
        assert!(!secrets_match(b"", b"x"));
        assert!(secrets_match(b"", b""));
    }
}
