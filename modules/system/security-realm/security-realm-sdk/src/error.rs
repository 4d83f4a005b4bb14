//! Error types for the security realm module.

use thiserror::Error;

/// Errors that can occur when using a realm capability.
#[derive(Debug, Error)]
pub enum SecurityRealmError {
    /// The credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The realm has no provider for the requested capability.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// A provider exists but could not be activated.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
