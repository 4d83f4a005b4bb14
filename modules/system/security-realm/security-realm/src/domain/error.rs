//! Domain errors for the security realm module.

use std::path::PathBuf;

use security_realm_sdk::SecurityRealmError;
use service_graph::{ActivationError, GraphError};

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    /// Mutually exclusive sections, or a required field is missing.
    #[error("invalid configuration for realm '{realm}': {reason}")]
    Configuration { realm: String, reason: String },

    #[error("cannot resolve expression '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    /// A node could not be registered or a dependency could not be found.
    #[error("service resolution failed: {0}")]
    Resolution(#[from] GraphError),

    #[error("cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("security realm '{0}' already exists")]
    RealmExists(String),

    #[error("security realm '{0}' not found")]
    RealmNotFound(String),

    #[error("activation failed: {0}")]
    Activation(#[from] ActivationError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A collaborator reported something missing outside any realm definition.
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub(crate) fn configuration(realm: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            realm: realm.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<SecurityRealmError> for DomainError {
    fn from(e: SecurityRealmError) -> Self {
        match e {
            SecurityRealmError::Unauthorized(msg) => Self::Unauthorized(msg),
            SecurityRealmError::NotConfigured(msg) => Self::NotConfigured(msg),
            SecurityRealmError::ServiceUnavailable(msg) => Self::Unavailable(msg),
            SecurityRealmError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<DomainError> for SecurityRealmError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Unauthorized(msg) => Self::Unauthorized(msg),
            DomainError::NotConfigured(msg) => Self::NotConfigured(msg),
            DomainError::RealmNotFound(realm) => {
                Self::NotConfigured(format!("security realm '{realm}' not found"))
            }
            DomainError::Configuration { realm, reason } => {
                Self::NotConfigured(format!("realm '{realm}': {reason}"))
            }
            e @ (DomainError::Activation(_) | DomainError::Io { .. }) => {
                Self::ServiceUnavailable(e.to_string())
            }
            DomainError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            e @ (DomainError::Expression { .. }
            | DomainError::Resolution(_)
            | DomainError::RealmExists(_)) => Self::Internal(e.to_string()),
            DomainError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// Maps a node activation failure onto the consumer-facing error.
pub(crate) fn unavailable(e: &ActivationError) -> SecurityRealmError {
    SecurityRealmError::ServiceUnavailable(e.to_string())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use service_graph::ServiceName;

    #[test]
    fn activation_failures_surface_as_unavailable() {
        let err: SecurityRealmError =
            DomainError::Activation(ActivationError::Removed(ServiceName::new("x"))).into();
        assert!(matches!(err, SecurityRealmError::ServiceUnavailable(_)));
    }

    #[test]
    fn unauthorized_round_trips() {
        let err: DomainError = SecurityRealmError::Unauthorized("bad password".to_owned()).into();
        let back: SecurityRealmError = err.into();
        assert!(matches!(back, SecurityRealmError::Unauthorized(m) if m == "bad password"));
    }

    #[test]
    fn not_configured_keeps_its_message_without_a_realm() {
        let err: DomainError = SecurityRealmError::NotConfigured("no chain 'other'".to_owned()).into();
        assert!(matches!(err, DomainError::NotConfigured(ref m) if m == "no chain 'other'"));
        assert!(!err.to_string().contains("realm"));

        let back: SecurityRealmError = err.into();
        assert!(matches!(back, SecurityRealmError::NotConfigured(m) if m == "no chain 'other'"));
    }
}
