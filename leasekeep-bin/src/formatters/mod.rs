pub(crate) mod color;
pub(crate) mod compact;
pub(crate) mod json;
pub(crate) mod log;

use anyhow::Result;
use leasekeep_lib::health::HealthCheckResult;
use leasekeep_lib::{Endpoint, Lease, PoolStats};
use serde::Serialize;

use crate::options::OutputFormat;

/// A lease together with the address of the leased endpoint
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LeaseReport {
    #[serde(flatten)]
    pub(crate) lease: Lease,
    pub(crate) endpoint: String,
}

impl LeaseReport {
    pub(crate) fn new(lease: Lease, endpoint: Option<&Endpoint>) -> Self {
        let endpoint = endpoint.map_or_else(|| lease.endpoint_id.to_string(), ToString::to_string);
        Self { lease, endpoint }
    }
}

/// A health check result together with the address of the checked endpoint
#[derive(Debug, Clone, Serialize)]
pub(crate) struct HealthReport {
    #[serde(flatten)]
    pub(crate) result: HealthCheckResult,
    pub(crate) endpoint: String,
}

impl HealthReport {
    pub(crate) fn new(result: HealthCheckResult, endpoint: Option<&Endpoint>) -> Self {
        let endpoint =
            endpoint.map_or_else(|| result.endpoint_id.to_string(), ToString::to_string);
        Self { result, endpoint }
    }
}

/// Renders command results for stdout
pub(crate) trait ReportFormatter {
    /// Format capacity figures of one or more pools
    fn format_stats(&self, stats: &[PoolStats]) -> Result<String>;

    /// Format the leases taken out by `acquire`
    fn format_leases(&self, leases: &[LeaseReport]) -> Result<String>;

    /// Format the results of a health check run
    fn format_health(&self, results: &[HealthReport]) -> Result<String>;
}

pub(crate) fn get_formatter(format: OutputFormat) -> Box<dyn ReportFormatter> {
    match format {
        OutputFormat::Compact => Box::new(compact::Compact::new()),
        OutputFormat::Json => Box::new(json::Json::new()),
    }
}
