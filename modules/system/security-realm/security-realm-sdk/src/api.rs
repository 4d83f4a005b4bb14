//! Public API trait for a security realm.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SecurityRealmError;
use crate::models::{
    AuthMechanism, AuthenticatedSubject, Credential, SecretIdentity, SslIdentity, Supplemental,
};

/// The aggregate capability of one installed realm.
///
/// Each part is optional: a realm only answers for the sections it was
/// configured with and reports `NotConfigured` otherwise.
///
/// ```ignore
/// let realm = realms.get("ManagementRealm").await?;
///
/// let subject = realm.authenticate(&Credential::password("admin", "pw")).await?;
/// let roles = realm.supplemental(&subject).await?.roles;
/// ```
#[async_trait]
pub trait SecurityRealmClient: Send + Sync {
    /// Realm name.
    fn name(&self) -> &str;

    /// Mechanisms the realm has a callback handler for, sorted.
    fn mechanisms(&self) -> Vec<AuthMechanism>;

    /// Verify a credential with the handler serving its mechanism.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the credential is rejected
    /// - `NotConfigured` if no handler serves the credential's mechanism
    /// - `ServiceUnavailable` if the handler could not be activated
    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError>;

    /// Groups for `subject`, plus the same names as roles when the realm maps
    /// groups to roles.
    ///
    /// A realm without authorization returns an empty [`Supplemental`].
    ///
    /// # Errors
    ///
    /// - `ServiceUnavailable` if the authorization node could not be activated
    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError>;

    /// TLS identity, when the realm has key or trust material.
    ///
    /// # Errors
    ///
    /// - `ServiceUnavailable` if the stores could not be loaded
    async fn ssl_identity(&self) -> Result<Option<Arc<SslIdentity>>, SecurityRealmError>;

    /// Shared secret identity, when configured.
    ///
    /// # Errors
    ///
    /// - `ServiceUnavailable` if the secret could not be decoded
    async fn secret(&self) -> Result<Option<Arc<SecretIdentity>>, SecurityRealmError>;
}
