//! Lease management for async callers.
//!
//! The ledger is synchronous and guarded by blocking locks. Calling it from
//! an async task directly would stall the executor thread under contention,
//! so [`AsyncLeaseManager`] moves every ledger call onto tokio's blocking
//! thread pool.

use log::debug;
use std::future::Future;
use std::sync::Arc;

use crate::manager::LeaseGuard;
use crate::{AcquireRequest, Lease, LeaseManager, Result, RetryPolicy};

/// An async facade over a shared [`LeaseManager`]
#[derive(Debug, Clone)]
pub struct AsyncLeaseManager {
    inner: Arc<LeaseManager>,
}

impl From<LeaseManager> for AsyncLeaseManager {
    fn from(manager: LeaseManager) -> Self {
        Self::new(Arc::new(manager))
    }
}

impl AsyncLeaseManager {
    /// Wrap a shared manager
    #[must_use]
    pub const fn new(inner: Arc<LeaseManager>) -> Self {
        Self { inner }
    }

    /// The wrapped manager, for synchronous calls
    #[must_use]
    pub const fn inner(&self) -> &Arc<LeaseManager> {
        &self.inner
    }

    /// See [`LeaseManager::acquire`]
    ///
    /// # Errors
    ///
    /// Fails like [`LeaseManager::acquire`], or if the blocking task dies.
    pub async fn acquire(&self, request: AcquireRequest) -> Result<Option<Lease>> {
        let manager = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || manager.acquire(&request)).await?
    }

    /// See [`LeaseManager::release`]
    ///
    /// # Errors
    ///
    /// Fails like [`LeaseManager::release`], or if the blocking task dies.
    pub async fn release(&self, lease: Lease) -> Result<Option<Lease>> {
        let manager = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || manager.release(&lease)).await?
    }

    /// See [`LeaseManager::reap_expired`]
    ///
    /// # Errors
    ///
    /// Fails like [`LeaseManager::reap_expired`], or if the blocking task
    /// dies.
    pub async fn reap_expired(&self) -> Result<usize> {
        let manager = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || manager.reap_expired()).await?
    }

    /// See [`LeaseManager::acquire_with_retry`]. Waits between attempts with
    /// [`tokio::time::sleep`], so no thread is blocked while waiting.
    ///
    /// # Errors
    ///
    /// Fails if the policy is invalid or an attempt fails.
    pub async fn acquire_with_retry(
        &self,
        request: AcquireRequest,
        policy: &RetryPolicy,
    ) -> Result<Option<Lease>> {
        policy.validate()?;

        let mut delays = policy.delays();
        loop {
            if let Some(lease) = self.acquire(request.clone()).await? {
                return Ok(Some(lease));
            }
            let Some(delay) = delays.next() else {
                return Ok(None);
            };
            debug!("No endpoint in pool {}, retrying in {delay:?}", request.pool);
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `f` with a freshly acquired lease (or `None` on a miss) and
    /// release the lease once the returned future completes.
    ///
    /// If the future panics or is dropped before completing, the lease is
    /// released synchronously instead.
    ///
    /// # Errors
    ///
    /// See [`AsyncLeaseManager::acquire`] and [`AsyncLeaseManager::release`].
    pub async fn with_lease<F, Fut, T>(&self, request: AcquireRequest, f: F) -> Result<T>
    where
        F: FnOnce(Option<Lease>) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.acquire(request).await?;
        self.run_guarded(lease, f).await
    }

    /// [`AsyncLeaseManager::with_lease`] on top of
    /// [`AsyncLeaseManager::acquire_with_retry`]
    ///
    /// # Errors
    ///
    /// See [`AsyncLeaseManager::acquire_with_retry`] and
    /// [`AsyncLeaseManager::release`].
    pub async fn with_retrying_lease<F, Fut, T>(
        &self,
        request: AcquireRequest,
        policy: &RetryPolicy,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Lease>) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.acquire_with_retry(request, policy).await?;
        self.run_guarded(lease, f).await
    }

    async fn run_guarded<F, Fut, T>(&self, lease: Option<Lease>, f: F) -> Result<T>
    where
        F: FnOnce(Option<Lease>) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = LeaseGuard::new(&self.inner, lease.clone());
        let output = f(lease).await;
        if let Some(lease) = guard.into_inner() {
            self.release(lease).await?;
        }
        Ok(output)
    }
}
