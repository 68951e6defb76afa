//! Per-run resource tracking and cancellation.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::domain::error::Cancelled;
use crate::domain::instance::InstanceHandle;

/// Owns one pipeline run's cancellation token and the instances it created.
///
/// Adapters register an instance as soon as it may exist on the provider
/// side, so cleanup can reach it even if creation is interrupted, a later
/// step fails or the run is cancelled.
#[derive(Debug, Default)]
pub struct RunScope {
    cancel: CancellationToken,
    created: Mutex<Vec<InstanceHandle>>,
}

impl RunScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled whenever `parent` is.
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            created: Mutex::default(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the scope is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token fires, otherwise `fut`'s own result.
    pub async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Cancelled.into()),
            r = fut => r,
        }
    }

    pub fn track(&self, handle: InstanceHandle) {
        tracing::debug!(instance = %handle.instance_id, "tracking instance for cleanup");
        self.created().push(handle);
    }

    /// Stop tracking `instance_id`; it now outlives the run.
    pub fn release(&self, instance_id: &str) {
        self.created().retain(|h| h.instance_id != instance_id);
    }

    #[must_use]
    pub fn tracked(&self) -> Vec<InstanceHandle> {
        self.created().clone()
    }

    /// Drain every tracked handle. A second call returns nothing.
    pub fn take_tracked(&self) -> Vec<InstanceHandle> {
        std::mem::take(&mut *self.created())
    }

    fn created(&self) -> MutexGuard<'_, Vec<InstanceHandle>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
