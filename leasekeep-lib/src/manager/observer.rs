use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;

use crate::{Filter, Lease, PoolStats, Selector};

/// Everything known about one acquire attempt, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct AcquireEvent {
    /// The granted lease, `None` on a miss
    pub lease: Option<Lease>,
    /// Pool the request targeted
    pub pool_name: String,
    /// Consumer the lease was requested for
    pub consumer_name: String,
    /// Filter used for the request
    #[serde(skip)]
    pub filter: Filter,
    /// Selection strategy used for the request
    pub selector: Selector,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// When the attempt finished
    pub completed_at: DateTime<Utc>,
    /// Time spent in the attempt
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Pool capacity right after the attempt
    pub pool_stats: Option<PoolStats>,
}

/// Everything known about one release
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseEvent {
    /// The lease as stored after the release
    pub lease: Lease,
    /// Pool the lease belonged to
    pub pool_name: String,
    /// When the lease was released
    pub released_at: Option<DateTime<Utc>>,
    /// How long the lease was held
    #[serde(with = "humantime_serde")]
    pub held_for: Option<Duration>,
    /// Pool capacity right after the release
    pub pool_stats: Option<PoolStats>,
}

/// Receives lease lifecycle events from a [`crate::LeaseManager`].
///
/// Callbacks run synchronously on the caller's thread, in registration
/// order, so they should be quick. Both methods default to doing nothing.
pub trait LeaseObserver: Debug + Send + Sync {
    /// Called after every acquire attempt
    fn on_acquire(&self, _event: &AcquireEvent) {}

    /// Called after every release
    fn on_release(&self, _event: &ReleaseEvent) {}
}

/// Logs every lease event at `info` level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LeaseObserver for LogObserver {
    fn on_acquire(&self, event: &AcquireEvent) {
        let available = event
            .pool_stats
            .as_ref()
            .map_or_else(|| "?".to_string(), |s| format!("{}/{}", s.available, s.total));
        match &event.lease {
            Some(lease) => info!(
                "[{}] {} acquired lease {} on endpoint {} in {:?} ({available} available)",
                event.pool_name,
                event.consumer_name,
                lease.id,
                lease.endpoint_id,
                event.elapsed,
            ),
            None => info!(
                "[{}] {} found no endpoint ({}, {available} available)",
                event.pool_name, event.consumer_name, event.selector,
            ),
        }
    }

    fn on_release(&self, event: &ReleaseEvent) {
        info!(
            "[{}] released lease {} after {:?}",
            event.pool_name,
            event.lease.id,
            event.held_for.unwrap_or_default(),
        );
    }
}
