use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConsumerId, PoolId};

/// A named collection of endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Unique identifier
    #[serde(default)]
    pub id: PoolId,
    /// Unique, human-readable name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

impl Pool {
    /// Create a pool with a fresh ID
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PoolId::new(),
            name: name.into(),
            description: None,
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Something that holds leases. Leases reference consumers by ID, so a
/// consumer can be renamed without orphaning its leases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Unique identifier
    #[serde(default)]
    pub id: ConsumerId,
    /// Unique, human-readable name
    pub name: String,
}

impl Consumer {
    /// Create a consumer with a fresh ID
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ConsumerId::new(),
            name: name.into(),
        }
    }
}

/// Aggregated capacity figures for a single pool, computed by scanning the
/// pool's endpoints at `collected_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Name of the pool
    pub pool_name: String,
    /// Number of endpoints in the pool
    pub total: usize,
    /// Endpoints whose status is `active`
    pub active: usize,
    /// Active endpoints with spare capacity
    pub available: usize,
    /// Endpoints holding at least one lease
    pub leased: usize,
    /// Sum of active leases over all endpoints
    pub total_leases: u64,
    /// When the snapshot was taken
    pub collected_at: DateTime<Utc>,
}

impl PoolStats {
    /// Share of active endpoints that can take another lease (0.0 to 1.0)
    #[must_use]
    pub fn availability(&self) -> f64 {
        if self.active == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let availability = self.available as f64 / self.active as f64;
        availability
    }
}
