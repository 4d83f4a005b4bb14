//! Authorization resolvers: the node that loads supplemental groups for a
//! verified subject.

pub mod ldap;
pub mod plugin;
pub mod properties;

use security_realm_sdk::SubjectSupplemental;
use service_graph::ServiceHandle;
use tracing::debug;

use super::authentication::missing_loader;
use super::context::BuildContext;
use super::error::DomainError;
use super::plugin_loader::PlugInLoader;
use crate::spec::AuthorizationSpec;

/// # Errors
///
/// Returns a [`DomainError`] if a dependency is missing, an expression
/// cannot be resolved or a node cannot be registered.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &AuthorizationSpec,
    share_connection: bool,
    loader: Option<&ServiceHandle<PlugInLoader>>,
) -> Result<ServiceHandle<dyn SubjectSupplemental>, DomainError> {
    match spec {
        AuthorizationSpec::Properties(file) => {
            debug!(realm = cx.realm, "Resolving properties authorization");
            properties::resolve(cx, file)
        }
        AuthorizationSpec::PlugIn(plug_in) => {
            debug!(realm = cx.realm, plug_in = %plug_in.name, "Resolving plug-in authorization");
            let loader = loader.ok_or_else(|| missing_loader(cx.realm))?;
            plugin::resolve(cx, plug_in, loader)
        }
        AuthorizationSpec::Ldap(ldap) => {
            debug!(realm = cx.realm, connection = %ldap.connection, "Resolving LDAP authorization");
            ldap::resolve(cx, ldap, share_connection)
        }
    }
}
