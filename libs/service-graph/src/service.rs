//! The [`Service`] trait implemented by every node.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ActivationError;

/// When a node is started.
///
/// A node commits to one mode when it is installed and keeps it for its
/// lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationMode {
    /// Started the first time something resolves it.
    #[default]
    OnDemand,
    /// Started as soon as its transaction is committed.
    Active,
}

/// A unit of the graph.
///
/// `start` produces the value other nodes see through a
/// [`ServiceHandle`](crate::ServiceHandle). Dependencies are passed to the
/// service's constructor as handles; required ones are already started when
/// `start` runs.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// The capability this node provides, usually a `dyn Trait`.
    type Value: ?Sized + Send + Sync + 'static;

    /// Build the capability.
    ///
    /// # Errors
    ///
    /// Returns an [`ActivationError`] if the capability cannot be built; the
    /// node stays inactive.
    async fn start(&self) -> Result<Arc<Self::Value>, ActivationError>;

    /// Release whatever `start` acquired. Called at most once per successful
    /// `start`.
    async fn stop(&self) {}
}

/// A node wrapping an already built value.
///
/// Hosts use it to publish external collaborators into the graph.
pub struct ValueService<T: ?Sized> {
    value: Arc<T>,
}

impl<T: ?Sized> ValueService<T> {
    #[must_use]
    pub fn new(value: Arc<T>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<T: ?Sized + Send + Sync + 'static> Service for ValueService<T> {
    type Value = T;

    async fn start(&self) -> Result<Arc<T>, ActivationError> {
        Ok(Arc::clone(&self.value))
    }
}

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Object-safe view of a [`Service`]; the started value is boxed as
/// `Arc<Arc<S::Value>>` so handles can downcast it back.
#[async_trait]
pub(crate) trait ErasedService: Send + Sync {
    async fn start_erased(&self) -> Result<AnyValue, ActivationError>;
    async fn stop_erased(&self);
}

#[async_trait]
impl<S: Service> ErasedService for S {
    async fn start_erased(&self) -> Result<AnyValue, ActivationError> {
        let value: Arc<S::Value> = self.start().await?;
        Ok(Arc::new(value))
    }

    async fn stop_erased(&self) {
        self.stop().await;
    }
}
