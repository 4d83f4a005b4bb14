//! Capabilities provided by the nodes of a realm.
//!
//! Every authentication node provides a [`CallbackHandler`] and every
//! authorization node a [`SubjectSupplemental`]. The realm aggregates them.

use async_trait::async_trait;

use crate::error::SecurityRealmError;
use crate::models::{AuthMechanism, AuthenticatedSubject, Credential, Supplemental};

/// Verifies credentials for one mechanism.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// Mechanism this handler serves.
    fn mechanism(&self) -> AuthMechanism;

    /// Verify `credential` and return the subject it authenticates.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the credential is rejected or of a kind this
    ///   handler does not verify
    /// - `ServiceUnavailable` if a backing store cannot be reached
    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError>;
}

/// Supplies group memberships for a verified subject.
#[async_trait]
pub trait SubjectSupplemental: Send + Sync {
    /// # Errors
    ///
    /// - `ServiceUnavailable` if a backing store cannot be reached
    /// - `Internal` for unexpected errors
    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError>;
}
