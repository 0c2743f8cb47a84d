use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

use crate::{ConsumerId, EndpointId, LeaseId, PoolId};

/// Lifecycle state of a [`Lease`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaseStatus {
    /// Counts against the endpoint's capacity
    Active,
    /// Released explicitly or by expiry; kept for audit
    Released,
}

/// A time-bounded reservation of one endpoint by one consumer.
///
/// A lease is either `Active` with no `released_at`, or `Released` with a
/// `released_at` timestamp. Only the ledger moves a lease from one state to
/// the other, and it never moves back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Unique identifier
    pub id: LeaseId,
    /// The leased endpoint
    pub endpoint_id: EndpointId,
    /// The consumer holding the lease
    pub consumer_id: ConsumerId,
    /// Pool of the endpoint at acquisition time
    pub pool_id: PoolId,
    /// Name of the pool at acquisition time
    pub pool_name: String,
    /// Current state
    pub status: LeaseStatus,
    /// When the lease was granted
    pub acquired_at: DateTime<Utc>,
    /// When the lease lapses unless released earlier
    pub expires_at: DateTime<Utc>,
    /// When the lease was released, if it was
    pub released_at: Option<DateTime<Utc>>,
}

impl Lease {
    /// Create an active lease starting at `now`
    #[must_use]
    pub fn new(
        endpoint_id: EndpointId,
        consumer_id: ConsumerId,
        pool_id: PoolId,
        pool_name: impl Into<String>,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: LeaseId::new(),
            endpoint_id,
            consumer_id,
            pool_id,
            pool_name: pool_name.into(),
            status: LeaseStatus::Active,
            acquired_at: now,
            expires_at: now
                .checked_add_signed(to_time_delta(duration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            released_at: None,
        }
    }

    /// Whether the lease still counts against capacity
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LeaseStatus::Active
    }

    /// Whether an active lease has outlived its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }

    /// Mark the lease as released. Returns `false` if it already was.
    pub(crate) fn release(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = LeaseStatus::Released;
        self.released_at = Some(now);
        true
    }

    /// How long the lease was held, if it has been released
    #[must_use]
    pub fn held_for(&self) -> Option<Duration> {
        self.released_at
            .map(|released| (released - self.acquired_at).to_std().unwrap_or_default())
    }
}

/// Convert a lease duration into a `chrono` delta, saturating at the
/// largest representable value instead of overflowing
pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
