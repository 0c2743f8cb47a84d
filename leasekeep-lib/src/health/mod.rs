//! Reachability checks for endpoints.
//!
//! The ledger only leases `active` endpoints. This module is what keeps
//! that status current: a [`Probe`] measures one endpoint, and the
//! [`HealthChecker`] runs probes over a whole pool and writes the outcome
//! back through [`crate::Storage::apply_health_result`].

mod checker;
mod options;
mod probe;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use checker::HealthChecker;
pub use options::{DEFAULT_TARGET_URL, HealthCheckOptions, MAX_ATTEMPTS};
pub use probe::{HttpProbe, Probe};

use crate::{Endpoint, EndpointId, EndpointStatus, Protocol};

/// Outcome of checking one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// The checked endpoint
    pub endpoint_id: EndpointId,
    /// Status derived from the check
    pub status: EndpointStatus,
    /// Round-trip time of the deciding attempt
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Protocol the endpoint was checked with
    pub protocol: Protocol,
    /// Number of attempts made
    pub attempts: u32,
    /// HTTP status code of the deciding attempt, if a response arrived
    pub status_code: Option<u16>,
    /// When the check finished
    pub checked_at: DateTime<Utc>,
    /// Why the endpoint is considered unhealthy
    pub error_message: Option<String>,
}

impl HealthCheckResult {
    /// An `inactive` result for an endpoint that could not be reached at
    /// all, charged with the full timeout as latency
    #[must_use]
    pub fn unreachable(endpoint: &Endpoint, timeout: Duration) -> Self {
        Self {
            endpoint_id: endpoint.id,
            status: EndpointStatus::Inactive,
            latency: timeout,
            protocol: endpoint.protocol,
            attempts: 0,
            status_code: None,
            checked_at: Utc::now(),
            error_message: None,
        }
    }

    /// Whether the endpoint answered as expected, fast or slow
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, EndpointStatus::Active | EndpointStatus::Slow)
    }
}
