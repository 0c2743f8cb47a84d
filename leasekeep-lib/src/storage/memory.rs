use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::storage::Storage;
use crate::{
    Consumer, ConsumerId, Endpoint, EndpointId, EndpointStatus, ErrorKind, Filter, Lease, LeaseId,
    Pool, PoolId, PoolStats, Result, Selector,
};

/// A pool together with the state the registry keeps for it
#[derive(Debug)]
struct PoolEntry {
    pool: Pool,
    /// Member endpoints in insertion order
    endpoints: Vec<EndpointId>,
    /// Round-robin cursor
    cursor: usize,
}

/// Everything which must change atomically together
#[derive(Debug, Default)]
struct Ledger {
    pools: HashMap<PoolId, PoolEntry>,
    pool_names: HashMap<String, PoolId>,
    endpoints: HashMap<EndpointId, Endpoint>,
    leases: HashMap<LeaseId, Lease>,
    /// Active leases ordered by expiry, so reaping never visits released
    /// leases
    expiries: BTreeSet<(DateTime<Utc>, LeaseId)>,
}

impl Ledger {
    fn pool_entry(&self, name: &str) -> Option<&PoolEntry> {
        self.pool_names.get(name).and_then(|id| self.pools.get(id))
    }

    /// Release one lease and give its capacity back.
    /// Returns the lease if it was active before.
    fn release(&mut self, lease_id: LeaseId, now: DateTime<Utc>) -> Option<Lease> {
        let lease = self.leases.get_mut(&lease_id)?;
        if !lease.release(now) {
            return None;
        }
        self.expiries.remove(&(lease.expires_at, lease_id));
        if let Some(endpoint) = self.endpoints.get_mut(&lease.endpoint_id) {
            endpoint.current_leases = endpoint.current_leases.saturating_sub(1);
        }
        Some(lease.clone())
    }
}

/// Process-local [`Storage`] backend.
///
/// Endpoint counters, lease records and round-robin cursors are guarded by
/// a single mutex, so that selecting an endpoint, advancing the cursor and
/// reserving capacity each happen in one critical section. Consumers are
/// independent of that state and live in a [`DashMap`].
///
/// Nothing is persisted: dropping the storage drops the ledger.
#[derive(Debug)]
pub struct InMemoryStorage {
    ledger: Mutex<Ledger>,
    /// Consumers by ID
    consumers: DashMap<ConsumerId, Consumer>,
    /// Consumer IDs by name
    consumer_names: DashMap<String, ConsumerId>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create an empty ledger using the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty ledger which takes the time from `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Mutex::default(),
            consumers: DashMap::new(),
            consumer_names: DashMap::new(),
            clock,
        }
    }

    /// Number of leases ever created, released ones included
    #[must_use]
    pub fn lease_count(&self) -> usize {
        self.ledger().leases.len()
    }

    /// Every critical section leaves the ledger consistent before doing
    /// anything that could panic, so a poisoned lock is safe to reuse.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn upsert_consumer(&self, consumer: Consumer) -> Consumer {
        match self.consumer_names.entry(consumer.name.clone()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                self.consumers
                    .get(&id)
                    .map_or(consumer, |stored| stored.clone())
            }
            Entry::Vacant(entry) => {
                self.consumers.insert(consumer.id, consumer.clone());
                entry.insert(consumer.id);
                debug!("Registered consumer {} ({})", consumer.name, consumer.id);
                consumer
            }
        }
    }
}

impl Storage for InMemoryStorage {
    fn add_pool(&self, pool: Pool) -> Result<Pool> {
        let mut ledger = self.ledger();
        if let Some(existing) = ledger.pool_entry(&pool.name) {
            return Ok(existing.pool.clone());
        }

        debug!("Registered pool {} ({})", pool.name, pool.id);
        ledger.pool_names.insert(pool.name.clone(), pool.id);
        ledger.pools.insert(
            pool.id,
            PoolEntry {
                pool: pool.clone(),
                endpoints: Vec::new(),
                cursor: 0,
            },
        );
        Ok(pool)
    }

    fn add_endpoint(&self, mut endpoint: Endpoint) -> Result<Endpoint> {
        endpoint.validate()?;

        let mut ledger = self.ledger();
        let Ledger {
            pools, endpoints, ..
        } = &mut *ledger;

        let entry = pools
            .get_mut(&endpoint.pool_id)
            .ok_or_else(|| ErrorKind::UnknownPool(endpoint.pool_id.to_string()))?;
        if let Some(existing) = endpoints.get(&endpoint.id) {
            return Ok(existing.clone());
        }

        endpoint.current_leases = 0;
        entry.endpoints.push(endpoint.id);
        endpoints.insert(endpoint.id, endpoint.clone());
        debug!("Registered endpoint {endpoint} in pool {}", entry.pool.name);
        Ok(endpoint)
    }

    fn add_consumer(&self, consumer: Consumer) -> Result<Consumer> {
        Ok(self.upsert_consumer(consumer))
    }

    fn ensure_consumer(&self, name: &str) -> Result<ConsumerId> {
        if let Some(id) = self.consumer_names.get(name) {
            return Ok(*id);
        }
        Ok(self.upsert_consumer(Consumer::new(name)).id)
    }

    fn pool(&self, name: &str) -> Option<Pool> {
        self.ledger().pool_entry(name).map(|entry| entry.pool.clone())
    }

    fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        self.ledger().endpoints.get(&id).cloned()
    }

    fn endpoints(&self, pool_name: &str) -> Vec<Endpoint> {
        let ledger = self.ledger();
        ledger
            .pool_entry(pool_name)
            .map(|entry| {
                entry
                    .endpoints
                    .iter()
                    .filter_map(|id| ledger.endpoints.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lease(&self, id: LeaseId) -> Option<Lease> {
        self.ledger().leases.get(&id).cloned()
    }

    fn find_available(
        &self,
        pool_name: &str,
        filter: &Filter,
        selector: Selector,
    ) -> Option<Endpoint> {
        let mut ledger = self.ledger();
        let Ledger {
            pools,
            pool_names,
            endpoints,
            ..
        } = &mut *ledger;

        let entry = pool_names.get(pool_name).and_then(|id| pools.get_mut(id))?;
        let candidates: Vec<&Endpoint> = entry
            .endpoints
            .iter()
            .filter_map(|id| endpoints.get(id))
            .filter(|endpoint| endpoint.is_available() && filter.matches(endpoint))
            .collect();

        let selected = selector.select(&candidates, &mut entry.cursor).cloned();
        debug!(
            "Pool {pool_name}: {} eligible endpoint(s), {selector} picked {}",
            candidates.len(),
            selected
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string)
        );
        selected
    }

    fn create_lease(
        &self,
        endpoint_id: EndpointId,
        consumer_id: ConsumerId,
        duration: Duration,
    ) -> Result<Lease> {
        if duration.is_zero() {
            return Err(ErrorKind::InvalidDuration(duration));
        }
        if !self.consumers.contains_key(&consumer_id) {
            return Err(ErrorKind::UnknownConsumer(consumer_id));
        }

        let now = self.clock.now();
        let mut ledger = self.ledger();
        let Ledger {
            pools,
            endpoints,
            leases,
            expiries,
            ..
        } = &mut *ledger;

        let endpoint = endpoints
            .get_mut(&endpoint_id)
            .ok_or(ErrorKind::UnknownEndpoint(endpoint_id))?;
        if !endpoint.is_available() {
            return Err(ErrorKind::CapacityExhausted(endpoint_id));
        }
        let pool_name = pools
            .get(&endpoint.pool_id)
            .map(|entry| entry.pool.name.clone())
            .unwrap_or_default();

        let lease = Lease::new(
            endpoint_id,
            consumer_id,
            endpoint.pool_id,
            pool_name,
            now,
            duration,
        );
        endpoint.current_leases += 1;
        expiries.insert((lease.expires_at, lease.id));
        leases.insert(lease.id, lease.clone());

        debug!(
            "Leased {endpoint} to consumer {consumer_id} until {} ({}/{})",
            lease.expires_at,
            endpoint.current_leases,
            endpoint
                .max_concurrency
                .map_or_else(|| "unbounded".to_string(), |max| max.to_string())
        );
        Ok(lease)
    }

    fn release_lease(&self, lease_id: LeaseId) -> Result<Option<Lease>> {
        let now = self.clock.now();
        let released = self.ledger().release(lease_id, now);
        if released.is_some() {
            debug!("Released lease {lease_id}");
        }
        Ok(released)
    }

    fn reap_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut ledger = self.ledger();

        let expired: Vec<LeaseId> = ledger
            .expiries
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .map(|(_, id)| *id)
            .collect();

        let reaped = expired
            .into_iter()
            .filter(|id| ledger.release(*id, now).is_some())
            .count();
        if reaped > 0 {
            debug!("Reaped {reaped} expired lease(s)");
        }
        Ok(reaped)
    }

    fn apply_health_result(
        &self,
        endpoint_id: EndpointId,
        status: EndpointStatus,
        checked_at: DateTime<Utc>,
    ) -> Option<Endpoint> {
        let mut ledger = self.ledger();
        let endpoint = ledger.endpoints.get_mut(&endpoint_id)?;
        endpoint.status = status;
        endpoint.checked_at = checked_at;
        Some(endpoint.clone())
    }

    fn pool_stats(&self, pool_name: &str) -> Option<PoolStats> {
        let ledger = self.ledger();
        let entry = ledger.pool_entry(pool_name)?;
        let members: Vec<&Endpoint> = entry
            .endpoints
            .iter()
            .filter_map(|id| ledger.endpoints.get(id))
            .collect();

        Some(PoolStats {
            pool_name: entry.pool.name.clone(),
            total: members.len(),
            active: members
                .iter()
                .filter(|e| e.status == EndpointStatus::Active)
                .count(),
            available: members.iter().filter(|e| e.is_available()).count(),
            leased: members.iter().filter(|e| e.current_leases > 0).count(),
            total_leases: members.iter().map(|e| u64::from(e.current_leases)).sum(),
            collected_at: self.clock.now(),
        })
    }
}
