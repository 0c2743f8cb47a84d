use anyhow::{Context, Result};
use leasekeep_lib::PoolStats;

use super::{HealthReport, LeaseReport, ReportFormatter};

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ReportFormatter for Json {
    fn format_stats(&self, stats: &[PoolStats]) -> Result<String> {
        serde_json::to_string_pretty(stats).context("Cannot format stats as JSON")
    }

    fn format_leases(&self, leases: &[LeaseReport]) -> Result<String> {
        serde_json::to_string_pretty(leases).context("Cannot format leases as JSON")
    }

    fn format_health(&self, results: &[HealthReport]) -> Result<String> {
        serde_json::to_string_pretty(results).context("Cannot format health results as JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leasekeep_lib::{ConsumerId, EndpointId, Lease, PoolId};
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn test_leases_are_flattened() {
        let lease = Lease::new(
            EndpointId::new(),
            ConsumerId::new(),
            PoolId::new(),
            "residential",
            Utc::now(),
            Duration::from_secs(60),
        );
        let report = LeaseReport {
            lease: lease.clone(),
            endpoint: "http://10.0.0.1:8080".into(),
        };

        let output = Json::new().format_leases(&[report]).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value[0]["endpoint"], "http://10.0.0.1:8080");
        assert_eq!(value[0]["pool_name"], "residential");
        assert_eq!(value[0]["status"], "active");
        assert_eq!(value[0]["id"], lease.id.to_string());
    }

    #[test]
    fn test_stats() {
        let stats = PoolStats {
            pool_name: "p".into(),
            total: 3,
            active: 2,
            available: 1,
            leased: 1,
            total_leases: 4,
            collected_at: Utc::now(),
        };
        let output = Json::new().format_stats(&[stats]).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["available"], 1);
        assert_eq!(value[0]["total_leases"], 4);
    }
}
