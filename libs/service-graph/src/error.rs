//! Error types for the service graph.

use thiserror::Error;

use crate::name::ServiceName;

/// Errors raised while registering, publishing or removing nodes.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node with this name is already registered or staged.
    #[error("service '{0}' is already registered")]
    Duplicate(ServiceName),

    /// No node with this name is registered.
    #[error("service '{0}' not found")]
    NotFound(ServiceName),

    /// A dependency edge points at a node that is not registered.
    #[error("service '{service}' depends on '{dependency}' which is not registered")]
    MissingDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    /// The node exists but provides a different value type.
    #[error("service '{name}' provides '{actual}', not '{expected}'")]
    TypeMismatch {
        name: ServiceName,
        expected: &'static str,
        actual: &'static str,
    },

    /// An eagerly activated node failed while its transaction was committed.
    #[error("service '{name}' failed to activate: {source}")]
    Activation {
        name: ServiceName,
        #[source]
        source: ActivationError,
    },
}

/// Errors raised when a node is started.
///
/// Returned to whichever caller triggered the activation; the node stays
/// inactive and a later call retries.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The node is staged in a transaction that has not been committed.
    #[error("service '{0}' is not installed")]
    NotInstalled(ServiceName),

    /// The node was removed from the graph.
    #[error("service '{0}' has been removed")]
    Removed(ServiceName),

    /// The started value could not be viewed as the requested type.
    #[error("service '{0}' produced an unexpected value type")]
    TypeMismatch(ServiceName),

    /// A required dependency failed to start.
    #[error("dependency '{dependency}' failed: {source}")]
    Dependency {
        dependency: ServiceName,
        #[source]
        source: Box<ActivationError>,
    },

    /// The service's own start logic failed.
    #[error("start failed: {0}")]
    Failed(String),
}

impl ActivationError {
    #[must_use]
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}
