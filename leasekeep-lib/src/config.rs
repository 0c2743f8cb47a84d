use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease duration used when a request doesn't name one
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(300);

/// Consumer name used when a request doesn't name one
pub const DEFAULT_CONSUMER: &str = "default";

/// Defaults applied by [`crate::LeaseManager`] to incomplete acquire requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    /// How long a lease lasts unless the request overrides it
    #[serde(default = "default_duration", with = "humantime_serde")]
    pub default_duration: Duration,

    /// Consumer charged for leases requested without a consumer name
    #[serde(default = "default_consumer")]
    pub default_consumer: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_duration: default_duration(),
            default_consumer: default_consumer(),
        }
    }
}

const fn default_duration() -> Duration {
    DEFAULT_LEASE_DURATION
}

fn default_consumer() -> String {
    DEFAULT_CONSUMER.to_string()
}
