//! Interfaces the host supplies to the realm module.
//!
//! Hosts publish implementations into the service graph under well-known
//! names (`path.<token>`, `ldap-connection.<name>`,
//! `security.simple-security-manager`) or hand them to the installer
//! directly (expression resolver, login contexts, plug-in modules).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::SecurityRealmError;
use crate::models::{LdapEntry, LdapSearch};

/// Maps a relative-path token to an absolute directory.
pub trait NamedPath: Send + Sync {
    fn path(&self) -> &Path;
}

/// Opens connections to one configured directory server.
#[async_trait]
pub trait LdapConnectionManager: Send + Sync {
    /// A connection bound with the manager's own search credentials.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the server cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn LdapConnection>, SecurityRealmError>;

    /// A connection bound as `dn`. A failed bind is `Unauthorized`.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the bind is rejected
    /// - `ServiceUnavailable` if the server cannot be reached
    async fn bind(
        &self,
        dn: &str,
        password: &SecretString,
    ) -> Result<Arc<dyn LdapConnection>, SecurityRealmError>;
}

/// An open directory connection. Must be safe to use concurrently.
#[async_trait]
pub trait LdapConnection: Send + Sync {
    /// # Errors
    ///
    /// `ServiceUnavailable` if the connection is lost.
    async fn search(&self, search: &LdapSearch) -> Result<Vec<LdapEntry>, SecurityRealmError>;
}

/// Security manager of a full server; verifies against its domains.
#[async_trait]
pub trait ServerSecurityManager: Send + Sync {
    /// # Errors
    ///
    /// `ServiceUnavailable` if the domain cannot be consulted.
    async fn authenticate(
        &self,
        security_domain: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError>;
}

/// Runs a named login-module chain when no security manager is present.
#[async_trait]
pub trait LoginContextFactory: Send + Sync {
    /// # Errors
    ///
    /// `NotConfigured` if no chain is known under `name`.
    async fn login(
        &self,
        name: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError>;
}

/// Resolves deferred configuration values (`${...}`) to literals.
pub trait ExpressionResolver: Send + Sync {
    /// # Errors
    ///
    /// `Internal` if the expression cannot be resolved.
    fn resolve(&self, expression: &str) -> Result<String, SecurityRealmError>;
}

/// Properties handed to a plug-in; `None` marks a name-only property.
pub type PlugInProperties = BTreeMap<String, Option<String>>;

/// A provider found in a plug-in module.
pub trait PlugInProvider: Send + Sync {
    /// A configured authentication plug-in named `name`, if this provider
    /// has one.
    fn authentication_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthenticationPlugIn>>;

    /// A configured authorization plug-in named `name`, if this provider has
    /// one.
    fn authorization_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthorizationPlugIn>>;
}

/// Loads the providers a plug-in module contributes.
pub trait PlugInModuleLoader: Send + Sync {
    /// # Errors
    ///
    /// `NotConfigured` if the module does not exist.
    fn load(&self, module: &str) -> Result<Vec<Arc<dyn PlugInProvider>>, SecurityRealmError>;
}

#[async_trait]
pub trait AuthenticationPlugIn: Send + Sync {
    /// # Errors
    ///
    /// `ServiceUnavailable` if the plug-in's backing store cannot be reached.
    async fn verify(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError>;
}

#[async_trait]
pub trait AuthorizationPlugIn: Send + Sync {
    /// # Errors
    ///
    /// `ServiceUnavailable` if the plug-in's backing store cannot be reached.
    async fn groups(&self, principal: &str) -> Result<Vec<String>, SecurityRealmError>;
}
