//! The consumer-facing entry point.
//!
//! [`LeaseManager`] turns "give me an endpoint from pool X" into the
//! sequence of ledger operations that makes it safe: register the consumer,
//! reap expired leases, find and select a candidate, reserve it. It also
//! reports every acquire and release to the registered observers.

mod guard;
mod observer;

use chrono::Utc;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use typed_builder::TypedBuilder;

pub use guard::LeaseGuard;
pub use observer::{AcquireEvent, LeaseObserver, LogObserver, ReleaseEvent};

use crate::storage::Storage;
use crate::{ErrorKind, Filter, Lease, LeaseConfig, Result, RetryPolicy, Selector};

/// What to lease, for whom and for how long
#[derive(TypedBuilder, Debug, Clone)]
pub struct AcquireRequest {
    /// Pool to lease from
    #[builder(setter(into))]
    pub pool: String,

    /// Consumer to charge, [`LeaseConfig::default_consumer`] if unset
    #[builder(default, setter(into, strip_option))]
    pub consumer: Option<String>,

    /// Lease duration, [`LeaseConfig::default_duration`] if unset
    #[builder(default, setter(strip_option))]
    pub duration: Option<Duration>,

    /// Constraints the endpoint must satisfy
    #[builder(default)]
    pub filter: Filter,

    /// How to choose among eligible endpoints
    #[builder(default)]
    pub selector: Selector,
}

impl AcquireRequest {
    /// Request any endpoint of `pool` with default settings
    #[must_use]
    pub fn new(pool: impl Into<String>) -> Self {
        Self::builder().pool(pool).build()
    }
}

/// Leases endpoints out of a [`Storage`] backend.
///
/// # Examples
///
/// ```
/// use leasekeep_lib::{AcquireRequest, InMemoryStorage, LeaseManager, bootstrap};
/// use std::sync::Arc;
///
/// # fn main() -> leasekeep_lib::Result<()> {
/// let storage = Arc::new(InMemoryStorage::new());
/// let pool = bootstrap::pool(storage.as_ref(), "residential")?;
/// bootstrap::endpoint(storage.as_ref(), &pool, "10.0.0.1", 3128)?;
///
/// let manager = LeaseManager::new(storage);
/// let lease = manager.acquire(&AcquireRequest::new("residential"))?;
/// assert!(lease.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LeaseManager {
    storage: Arc<dyn Storage>,
    config: LeaseConfig,
    observers: Vec<Arc<dyn LeaseObserver>>,
}

impl LeaseManager {
    /// Create a manager with the default [`LeaseConfig`] and no observers
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            config: LeaseConfig::default(),
            observers: Vec::new(),
        }
    }

    /// Replace the request defaults
    #[must_use]
    pub fn with_config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an observer. Observers are notified in registration order.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LeaseObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The backend this manager leases from
    #[must_use]
    pub const fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The request defaults in use
    #[must_use]
    pub const fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Lease an endpoint.
    ///
    /// Returns `Ok(None)` if no endpoint is eligible, including when the
    /// pool doesn't exist or another caller took the last slot first.
    /// Observers are told about the attempt either way.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidDuration`] for a zero duration, or
    /// with the storage error if a ledger operation fails.
    pub fn acquire(&self, request: &AcquireRequest) -> Result<Option<Lease>> {
        let duration = request.duration.unwrap_or(self.config.default_duration);
        if duration.is_zero() {
            return Err(ErrorKind::InvalidDuration(duration));
        }
        let consumer_name = request
            .consumer
            .as_deref()
            .unwrap_or(self.config.default_consumer.as_str());

        let started_at = Utc::now();
        let timer = Instant::now();

        let consumer_id = self.storage.ensure_consumer(consumer_name)?;
        self.storage.reap_expired()?;

        let lease = match self
            .storage
            .find_available(&request.pool, &request.filter, request.selector)
        {
            None => None,
            Some(endpoint) => match self
                .storage
                .create_lease(endpoint.id, consumer_id, duration)
            {
                Ok(lease) => Some(lease),
                Err(e) if e.is_conflict() => {
                    debug!("Lost endpoint {endpoint} to a concurrent acquire: {e}");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let event = AcquireEvent {
            lease: lease.clone(),
            pool_name: request.pool.clone(),
            consumer_name: consumer_name.to_string(),
            filter: request.filter.clone(),
            selector: request.selector,
            started_at,
            completed_at: Utc::now(),
            elapsed: timer.elapsed(),
            pool_stats: self.storage.pool_stats(&request.pool),
        };
        for observer in &self.observers {
            observer.on_acquire(&event);
        }

        Ok(lease)
    }

    /// Give a lease back.
    ///
    /// Returns the released record if this call released it. Releasing an
    /// unknown or already released lease changes nothing, but observers are
    /// still notified.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the release cannot be recorded.
    pub fn release(&self, lease: &Lease) -> Result<Option<Lease>> {
        let released = self.storage.release_lease(lease.id)?;

        let record = released
            .clone()
            .or_else(|| self.storage.lease(lease.id))
            .unwrap_or_else(|| lease.clone());
        let event = ReleaseEvent {
            pool_name: record.pool_name.clone(),
            released_at: record.released_at,
            held_for: record.held_for(),
            pool_stats: self.storage.pool_stats(&record.pool_name),
            lease: record,
        };
        for observer in &self.observers {
            observer.on_release(&event);
        }

        Ok(released)
    }

    /// Release every expired lease. Returns how many were released.
    ///
    /// [`LeaseManager::acquire`] already does this before every lookup.
    /// Call it on a schedule to free capacity in quiet periods too.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the sweep fails.
    pub fn reap_expired(&self) -> Result<usize> {
        self.storage.reap_expired()
    }

    /// Acquire a lease which is released when the returned guard is dropped
    ///
    /// # Errors
    ///
    /// See [`LeaseManager::acquire`].
    pub fn lease_guard(&self, request: &AcquireRequest) -> Result<LeaseGuard<'_>> {
        let lease = self.acquire(request)?;
        Ok(LeaseGuard::new(self, lease))
    }

    /// Run `f` with a freshly acquired lease (or `None` on a miss) and
    /// release the lease afterwards, even if `f` panics.
    ///
    /// # Errors
    ///
    /// See [`LeaseManager::acquire`] and [`LeaseManager::release`].
    pub fn with_lease<F, T>(&self, request: &AcquireRequest, f: F) -> Result<T>
    where
        F: FnOnce(Option<&Lease>) -> T,
    {
        let guard = self.lease_guard(request)?;
        let output = f(guard.lease());
        guard.release()?;
        Ok(output)
    }

    /// Acquire, retrying misses according to `policy`.
    ///
    /// `sleep` is called with each delay between attempts, which lets
    /// callers decide how to wait (or not wait at all in tests).
    ///
    /// # Errors
    ///
    /// Fails if the policy is invalid or an attempt fails. Errors are not
    /// retried.
    pub fn acquire_with_retry<S>(
        &self,
        request: &AcquireRequest,
        policy: &RetryPolicy,
        mut sleep: S,
    ) -> Result<Option<Lease>>
    where
        S: FnMut(Duration),
    {
        policy.validate()?;

        let mut delays = policy.delays();
        let mut attempt = 1;
        loop {
            if let Some(lease) = self.acquire(request)? {
                return Ok(Some(lease));
            }
            let Some(delay) = delays.next() else {
                debug!(
                    "No endpoint in pool {} after {attempt} attempt(s)",
                    request.pool
                );
                return Ok(None);
            };
            debug!(
                "No endpoint in pool {} (attempt {attempt}/{}), retrying in {delay:?}",
                request.pool, policy.max_attempts
            );
            sleep(delay);
            attempt += 1;
        }
    }

    /// [`LeaseManager::with_lease`] on top of
    /// [`LeaseManager::acquire_with_retry`]
    ///
    /// # Errors
    ///
    /// See [`LeaseManager::acquire_with_retry`] and [`LeaseManager::release`].
    pub fn with_retrying_lease<S, F, T>(
        &self,
        request: &AcquireRequest,
        policy: &RetryPolicy,
        sleep: S,
        f: F,
    ) -> Result<T>
    where
        S: FnMut(Duration),
        F: FnOnce(Option<&Lease>) -> T,
    {
        let lease = self.acquire_with_retry(request, policy, sleep)?;
        let guard = LeaseGuard::new(self, lease);
        let output = f(guard.lease());
        guard.release()?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::test_utils::seeded_pool;
    use crate::{
        ConsumerId, Endpoint, EndpointId, EndpointStatus, LeaseId, LeaseStatus, Pool, PoolStats,
    };
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        acquires: Mutex<Vec<AcquireEvent>>,
        releases: Mutex<Vec<ReleaseEvent>>,
    }

    impl LeaseObserver for Recorder {
        fn on_acquire(&self, event: &AcquireEvent) {
            self.log.lock().unwrap().push(format!("{}:acquire", self.name));
            self.acquires.lock().unwrap().push(event.clone());
        }

        fn on_release(&self, event: &ReleaseEvent) {
            self.log.lock().unwrap().push(format!("{}:release", self.name));
            self.releases.lock().unwrap().push(event.clone());
        }
    }

    fn manager_with_pool(limits: &[Option<u32>]) -> (LeaseManager, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        seeded_pool(storage.as_ref(), "p", limits);
        (LeaseManager::new(storage.clone()), storage)
    }

    #[test]
    fn test_acquire_release_cycle() {
        let (manager, _) = manager_with_pool(&[Some(1)]);
        let request = AcquireRequest::new("p");

        let lease = manager.acquire(&request).unwrap().unwrap();
        assert!(manager.acquire(&request).unwrap().is_none());

        let released = manager.release(&lease).unwrap().unwrap();
        assert_eq!(released.status, LeaseStatus::Released);
        assert!(manager.acquire(&request).unwrap().is_some());
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let (manager, storage) = manager_with_pool(&[None]);
        let request = AcquireRequest::builder()
            .pool("p")
            .duration(Duration::ZERO)
            .build();

        let err = manager.acquire(&request).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(storage.lease_count(), 0);
    }

    #[test]
    fn test_defaults_are_applied() {
        let (manager, storage) = manager_with_pool(&[None]);
        let manager = manager.with_config(LeaseConfig {
            default_duration: Duration::from_secs(42),
            default_consumer: "anonymous".into(),
        });

        let lease = manager.acquire(&AcquireRequest::new("p")).unwrap().unwrap();
        assert_eq!(
            (lease.expires_at - lease.acquired_at).num_seconds(),
            42
        );
        assert_eq!(
            storage.ensure_consumer("anonymous").unwrap(),
            lease.consumer_id
        );
        assert_eq!(lease.pool_name, "p");
    }

    #[test]
    fn test_unknown_pool_is_a_miss() {
        let (manager, _) = manager_with_pool(&[]);
        assert!(
            manager
                .acquire(&AcquireRequest::new("elsewhere"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_filter_and_selector_are_forwarded() {
        let storage = Arc::new(InMemoryStorage::new());
        let pool = storage.add_pool(Pool::new("p")).unwrap();
        for country in ["AR", "BR"] {
            let endpoint = Endpoint::builder()
                .pool_id(pool.id)
                .host("10.0.0.1")
                .port(8080)
                .status(EndpointStatus::Active)
                .country(country)
                .build();
            storage.add_endpoint(endpoint).unwrap();
        }
        let manager = LeaseManager::new(storage.clone());

        let request = AcquireRequest::builder()
            .pool("p")
            .filter(Filter::builder().country("BR").build().unwrap())
            .selector(Selector::LeastLoaded)
            .build();
        let lease = manager.acquire(&request).unwrap().unwrap();
        let endpoint = storage.endpoint(lease.endpoint_id).unwrap();
        assert_eq!(endpoint.country.as_deref(), Some("BR"));
    }

    #[test]
    fn test_observers_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(Recorder {
            name: "first",
            log: log.clone(),
            ..Recorder::default()
        });
        let second = Arc::new(Recorder {
            name: "second",
            log: log.clone(),
            ..Recorder::default()
        });

        let (manager, _) = manager_with_pool(&[Some(1)]);
        let manager = manager
            .with_observer(first.clone())
            .with_observer(second.clone());

        let lease = manager.acquire(&AcquireRequest::new("p")).unwrap().unwrap();
        assert!(manager.acquire(&AcquireRequest::new("p")).unwrap().is_none());
        manager.release(&lease).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:acquire",
                "second:acquire",
                "first:acquire",
                "second:acquire",
                "first:release",
                "second:release",
            ]
        );

        let acquires = first.acquires.lock().unwrap();
        assert_eq!(acquires[0].lease.as_ref().map(|l| l.id), Some(lease.id));
        assert_eq!(acquires[0].consumer_name, "default");
        assert_eq!(acquires[0].pool_stats.as_ref().unwrap().total_leases, 1);
        assert!(acquires[1].lease.is_none());
        assert!(acquires[1].completed_at >= acquires[1].started_at);

        let releases = first.releases.lock().unwrap();
        assert_eq!(releases[0].lease.id, lease.id);
        assert_eq!(releases[0].pool_name, "p");
        assert!(releases[0].released_at.is_some());
        assert!(releases[0].held_for.is_some());
        assert_eq!(releases[0].pool_stats.as_ref().unwrap().total_leases, 0);
    }

    #[test]
    fn test_lease_guard_releases_on_drop() {
        let (manager, storage) = manager_with_pool(&[Some(1)]);
        let request = AcquireRequest::new("p");

        let id = {
            let guard = manager.lease_guard(&request).unwrap();
            let lease = guard.lease().unwrap().clone();
            assert!(manager.acquire(&request).unwrap().is_none());
            lease.id
        };
        assert!(!storage.lease(id).unwrap().is_active());

        let guard = manager.lease_guard(&request).unwrap();
        let kept = guard.into_inner().unwrap();
        assert!(storage.lease(kept.id).unwrap().is_active());
    }

    #[test]
    fn test_with_lease_releases_on_panic() {
        let (manager, storage) = manager_with_pool(&[Some(1)]);
        let request = AcquireRequest::new("p");
        let seen = Mutex::new(None);

        let result = catch_unwind(AssertUnwindSafe(|| {
            manager.with_lease(&request, |lease| {
                *seen.lock().unwrap() = lease.map(|l| l.id);
                panic!("boom");
            })
        }));
        assert!(result.is_err());

        let id = seen.into_inner().unwrap().unwrap();
        assert_eq!(storage.lease(id).unwrap().status, LeaseStatus::Released);
        assert!(storage.pool_stats("p").unwrap().available == 1);
    }

    #[test]
    fn test_with_lease_on_miss() {
        let (manager, _) = manager_with_pool(&[]);
        let got = manager
            .with_lease(&AcquireRequest::new("p"), |lease| lease.is_some())
            .unwrap();
        assert!(!got);
    }

    #[test]
    fn test_retry_succeeds_after_release() {
        let (manager, _) = manager_with_pool(&[Some(1)]);
        let request = AcquireRequest::new("p");
        let holder = manager.acquire(&request).unwrap().unwrap();

        let mut delays = Vec::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let lease = manager
            .acquire_with_retry(&request, &policy, |delay| {
                delays.push(delay);
                manager.release(&holder).unwrap();
            })
            .unwrap();

        assert!(lease.is_some());
        assert_eq!(delays, vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_retry_gives_up() {
        let (manager, _) = manager_with_pool(&[]);
        let mut delays = Vec::new();
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        let lease = manager
            .acquire_with_retry(&AcquireRequest::new("p"), &policy, |d| delays.push(d))
            .unwrap();

        assert!(lease.is_none());
        assert_eq!(delays, vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_retry_rejects_invalid_policy() {
        let (manager, _) = manager_with_pool(&[None]);
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        let err = manager
            .acquire_with_retry(&AcquireRequest::new("p"), &policy, |_| {})
            .unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidRetryPolicy(_)));
    }

    #[test]
    fn test_with_retrying_lease() {
        let (manager, storage) = manager_with_pool(&[Some(1)]);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let id = manager
            .with_retrying_lease(&AcquireRequest::new("p"), &policy, |_| {}, |lease| {
                lease.map(|l| l.id)
            })
            .unwrap()
            .unwrap();
        assert!(!storage.lease(id).unwrap().is_active());
    }

    /// Finds endpoints normally, but always loses the reservation race
    #[derive(Debug, Default)]
    struct Contended(InMemoryStorage);

    impl Storage for Contended {
        fn add_pool(&self, pool: Pool) -> Result<Pool> {
            self.0.add_pool(pool)
        }
        fn add_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint> {
            self.0.add_endpoint(endpoint)
        }
        fn add_consumer(&self, consumer: crate::Consumer) -> Result<crate::Consumer> {
            self.0.add_consumer(consumer)
        }
        fn ensure_consumer(&self, name: &str) -> Result<ConsumerId> {
            self.0.ensure_consumer(name)
        }
        fn pool(&self, name: &str) -> Option<Pool> {
            self.0.pool(name)
        }
        fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
            self.0.endpoint(id)
        }
        fn endpoints(&self, pool_name: &str) -> Vec<Endpoint> {
            self.0.endpoints(pool_name)
        }
        fn lease(&self, id: LeaseId) -> Option<Lease> {
            self.0.lease(id)
        }
        fn find_available(
            &self,
            pool_name: &str,
            filter: &Filter,
            selector: Selector,
        ) -> Option<Endpoint> {
            self.0.find_available(pool_name, filter, selector)
        }
        fn create_lease(
            &self,
            endpoint_id: EndpointId,
            _: ConsumerId,
            _: Duration,
        ) -> Result<Lease> {
            Err(ErrorKind::CapacityExhausted(endpoint_id))
        }
        fn release_lease(&self, lease_id: LeaseId) -> Result<Option<Lease>> {
            self.0.release_lease(lease_id)
        }
        fn reap_expired(&self) -> Result<usize> {
            self.0.reap_expired()
        }
        fn apply_health_result(
            &self,
            endpoint_id: EndpointId,
            status: EndpointStatus,
            checked_at: DateTime<Utc>,
        ) -> Option<Endpoint> {
            self.0.apply_health_result(endpoint_id, status, checked_at)
        }
        fn pool_stats(&self, pool_name: &str) -> Option<PoolStats> {
            self.0.pool_stats(pool_name)
        }
    }

    #[test]
    fn test_conflict_is_a_miss() {
        let storage = Arc::new(Contended::default());
        seeded_pool(storage.as_ref(), "p", &[Some(1)]);
        let recorder = Arc::new(Recorder::default());
        let manager = LeaseManager::new(storage).with_observer(recorder.clone());

        assert!(manager.acquire(&AcquireRequest::new("p")).unwrap().is_none());
        assert_eq!(recorder.acquires.lock().unwrap().len(), 1);
    }
}
