//! Backends holding pools, endpoints, consumers and leases.
//!
//! A backend combines two roles: the *pool registry* (which endpoints belong
//! to which pool, plus the per-pool round-robin cursor) and the *lease
//! ledger* (who holds which endpoint until when). Both live behind the
//! [`Storage`] trait so that the [`crate::LeaseManager`] never depends on a
//! concrete backend.

#[cfg(any(test, feature = "contract-tests"))]
#[doc(hidden)]
pub mod contract;
mod memory;

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

pub use memory::InMemoryStorage;

use crate::{
    Consumer, ConsumerId, Endpoint, EndpointId, EndpointStatus, Filter, Lease, LeaseId, Pool,
    PoolStats, Result, Selector,
};

/// A lease ledger and pool registry.
///
/// Implementations must be safe to share between threads. Every method is a
/// single atomic step with respect to the ledger: in particular,
/// [`Storage::create_lease`] re-validates capacity and increments the
/// endpoint counter in the same critical section, so concurrent callers can
/// never push an endpoint above its concurrency limit.
pub trait Storage: Debug + Send + Sync {
    /// Register a pool. Registering the same name twice returns the pool
    /// stored first.
    ///
    /// # Errors
    ///
    /// Backends may fail if the record cannot be persisted.
    fn add_pool(&self, pool: Pool) -> Result<Pool>;

    /// Register an endpoint in its pool.
    ///
    /// The endpoint's lease counter always starts at zero. Registering the
    /// same endpoint ID twice returns the stored record unchanged.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint doesn't pass [`Endpoint::validate`] or if its
    /// pool is unknown.
    fn add_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint>;

    /// Register a consumer. Registering the same name twice returns the
    /// consumer stored first.
    ///
    /// # Errors
    ///
    /// Backends may fail if the record cannot be persisted.
    fn add_consumer(&self, consumer: Consumer) -> Result<Consumer>;

    /// Look up a consumer by name, creating it if needed
    ///
    /// # Errors
    ///
    /// Backends may fail if the record cannot be persisted.
    fn ensure_consumer(&self, name: &str) -> Result<ConsumerId>;

    /// Find a pool by name
    fn pool(&self, name: &str) -> Option<Pool>;

    /// Find an endpoint by ID
    fn endpoint(&self, id: EndpointId) -> Option<Endpoint>;

    /// All endpoints of a pool in insertion order. Unknown pools have none.
    fn endpoints(&self, pool_name: &str) -> Vec<Endpoint>;

    /// Find a lease by ID, including released ones
    fn lease(&self, id: LeaseId) -> Option<Lease>;

    /// Pick an active endpoint with spare capacity which matches `filter`.
    ///
    /// Returns `None` for unknown pools and when nothing matches. The
    /// endpoint is not reserved: call [`Storage::create_lease`] with it.
    fn find_available(&self, pool_name: &str, filter: &Filter, selector: Selector)
    -> Option<Endpoint>;

    /// Reserve capacity on an endpoint for `duration`.
    ///
    /// # Errors
    ///
    /// - [`crate::ErrorKind::UnknownEndpoint`] or
    ///   [`crate::ErrorKind::UnknownConsumer`] if a referenced record is
    ///   missing
    /// - [`crate::ErrorKind::CapacityExhausted`] if the endpoint lost its
    ///   capacity or its active status since it was found
    fn create_lease(
        &self,
        endpoint_id: EndpointId,
        consumer_id: ConsumerId,
        duration: Duration,
    ) -> Result<Lease>;

    /// Release a lease, freeing its capacity.
    ///
    /// Returns the released lease if this call released it. Unknown and
    /// already released leases yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Backends may fail if the change cannot be persisted.
    fn release_lease(&self, lease_id: LeaseId) -> Result<Option<Lease>>;

    /// Release every active lease whose expiry has passed.
    /// Returns how many leases this call released.
    ///
    /// # Errors
    ///
    /// Backends may fail if the change cannot be persisted.
    fn reap_expired(&self) -> Result<usize>;

    /// Record the outcome of a health check. Only `status` and `checked_at`
    /// change. Returns the updated endpoint, or `None` if it is unknown.
    fn apply_health_result(
        &self,
        endpoint_id: EndpointId,
        status: EndpointStatus,
        checked_at: DateTime<Utc>,
    ) -> Option<Endpoint>;

    /// Capacity snapshot of a pool, `None` if the pool is unknown
    fn pool_stats(&self, pool_name: &str) -> Option<PoolStats>;
}
