#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Security Realm SDK
//!
//! This crate provides the public API for the `security_realm` module:
//!
//! - [`SecurityRealmClient`] - Aggregate realm capability for consumers
//! - [`CallbackHandler`], [`SubjectSupplemental`] - Capabilities provided by realm nodes
//! - [`SslIdentity`], [`SecretIdentity`] - Server identity material
//! - [`Credential`], [`AuthenticatedSubject`], [`Supplemental`] - Models
//! - [`collaborators`] - Interfaces the host must supply (paths, directory
//!   connections, security manager, expressions, plug-in modules)
//! - [`SecurityRealmError`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use security_realm_sdk::{Credential, SecurityRealmClient};
//!
//! let realm = realms.get("ManagementRealm").await?;
//! let subject = realm
//!     .authenticate(&Credential::password("admin", "secret"))
//!     .await?;
//! let supplemental = realm.supplemental(&subject).await?;
//! ```

pub mod api;
pub mod capabilities;
pub mod collaborators;
pub mod error;
pub mod models;

// Re-export main types at crate root
pub use api::SecurityRealmClient;
pub use capabilities::{CallbackHandler, SubjectSupplemental};
pub use collaborators::{
    AuthenticationPlugIn, AuthorizationPlugIn, ExpressionResolver, LdapConnection,
    LdapConnectionManager, LoginContextFactory, NamedPath, PlugInModuleLoader, PlugInProperties,
    PlugInProvider, ServerSecurityManager,
};
pub use error::SecurityRealmError;
pub use models::{
    AuthMechanism, AuthenticatedSubject, Credential, GroupName, KeystoreMaterial, LdapEntry,
    LdapSearch, SearchScope, SecretIdentity, SslIdentity, Supplemental, rdn_value,
};
