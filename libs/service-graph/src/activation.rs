use std::future::Future;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::ActivationError;
use crate::service::AnyValue;

/// Resettable holder of a node's started value.
///
/// Uses a single-flight pattern: even under concurrent callers the start
/// function runs at most once per activation. A failed start caches nothing.
pub struct ActivationCell {
    /// Started value (sync lock for fast access).
    value: RwLock<Option<AnyValue>>,
    /// Serializes start and reset.
    start_lock: Mutex<()>,
}

impl ActivationCell {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            start_lock: Mutex::new(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.value.read().is_some()
    }

    /// Returns the started value, or starts it using `start`.
    pub async fn get_or_start<F, Fut>(&self, start: F) -> Result<AnyValue, ActivationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnyValue, ActivationError>>,
    {
        // Fast path: already started (sync lock, no await)
        if let Some(value) = self.value.read().as_ref() {
            return Ok(AnyValue::clone(value));
        }

        let _start_guard = self.start_lock.lock().await;

        // Another caller may have finished while we waited
        if let Some(value) = self.value.read().as_ref() {
            return Ok(AnyValue::clone(value));
        }

        let value = start().await?;
        *self.value.write() = Some(AnyValue::clone(&value));
        Ok(value)
    }

    /// Clears the started value.
    ///
    /// Returns `true` if there was one, in which case the caller owns the
    /// matching stop.
    pub async fn reset(&self) -> bool {
        let _start_guard = self.start_lock.lock().await;
        self.value.write().take().is_some()
    }
}
