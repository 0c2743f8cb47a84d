use anyhow::Result;
use console::Style;
use leasekeep_lib::{EndpointStatus, PoolStats};
use std::fmt::{self, Display, Write};
use std::sync::LazyLock;

use super::{HealthReport, LeaseReport, ReportFormatter};
use crate::formatters::color::{
    BOLD_GREEN, BOLD_PINK, BOLD_YELLOW, DIM, GREEN, NORMAL, PINK, YELLOW, color,
};

struct CompactPoolStats<'a>(&'a PoolStats);

impl Display for CompactPoolStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.0;

        color!(f, BOLD_YELLOW, "[{}]", stats.pool_name)?;

        let style = availability_style(stats);
        color!(
            f,
            style,
            " {}/{} available",
            stats.available,
            stats.active
        )?;
        color!(f, NORMAL, " · {} endpoints", stats.total)?;
        write_if_any(stats.leased, "leased", &YELLOW, f)?;
        write_if_any(stats.total.saturating_sub(stats.active), "not active", &PINK, f)?;
        color!(f, DIM, " · {} active leases", stats.total_leases)
    }
}

fn availability_style(stats: &PoolStats) -> &'static LazyLock<Style> {
    match stats.availability() {
        a if a >= 0.5 => &BOLD_GREEN,
        a if a > 0.0 => &BOLD_YELLOW,
        _ => &BOLD_PINK,
    }
}

fn write_if_any(
    value: usize,
    text: &str,
    style: &LazyLock<Style>,
    f: &mut fmt::Formatter<'_>,
) -> Result<(), fmt::Error> {
    if value > 0 {
        color!(f, style, " · {} {}", value, text)?;
    }
    Ok(())
}

struct CompactLease<'a>(&'a LeaseReport);

impl Display for CompactLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let LeaseReport { lease, endpoint } = self.0;
        color!(f, GREEN, "[{}]", lease.status)?;
        write!(f, " {endpoint} ")?;
        color!(
            f,
            DIM,
            "(pool {}, lease {}, until {})",
            lease.pool_name,
            lease.id,
            lease.expires_at.to_rfc3339()
        )
    }
}

struct CompactHealth<'a>(&'a HealthReport);

impl Display for CompactHealth<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let HealthReport { result, endpoint } = self.0;

        let style = match result.status {
            EndpointStatus::Active => &GREEN,
            EndpointStatus::Slow => &YELLOW,
            EndpointStatus::Inactive | EndpointStatus::Banned => &PINK,
        };
        color!(f, style, "[{}]", result.status)?;
        write!(f, " {endpoint}")?;

        if let Some(code) = result.status_code {
            write!(f, " HTTP {code}")?;
        }
        color!(
            f,
            DIM,
            " ({} in {} attempt(s))",
            humantime::format_duration(result.latency),
            result.attempts
        )?;
        if let Some(message) = &result.error_message {
            color!(f, DIM, " {}", message)?;
        }
        Ok(())
    }
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ReportFormatter for Compact {
    fn format_stats(&self, stats: &[PoolStats]) -> Result<String> {
        let mut output = String::new();
        for pool in stats {
            writeln!(output, "{}", CompactPoolStats(pool))?;
        }
        Ok(output)
    }

    fn format_leases(&self, leases: &[LeaseReport]) -> Result<String> {
        let mut output = String::new();
        for lease in leases {
            writeln!(output, "{}", CompactLease(lease))?;
        }
        Ok(output)
    }

    fn format_health(&self, results: &[HealthReport]) -> Result<String> {
        let mut output = String::new();
        for result in results {
            writeln!(output, "{}", CompactHealth(result))?;
        }

        let healthy = results.iter().filter(|r| r.result.is_healthy()).count();
        let style = if healthy == results.len() {
            &BOLD_GREEN
        } else {
            &BOLD_PINK
        };
        writeln!(
            output,
            "{}",
            style.apply_to(format!("{healthy}/{} endpoints healthy", results.len()))
        )?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leasekeep_lib::health::HealthCheckResult;
    use leasekeep_lib::{EndpointId, Protocol};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn stats(active: usize, available: usize) -> PoolStats {
        PoolStats {
            pool_name: "residential".into(),
            total: 4,
            active,
            available,
            leased: active - available,
            total_leases: (active - available) as u64,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_stats() {
        console::set_colors_enabled(false);

        let output = Compact::new().format_stats(&[stats(3, 1)]).unwrap();
        assert_eq!(
            output,
            "[residential] 1/3 available · 4 endpoints · 2 leased · 1 not active · 2 active leases\n"
        );
    }

    #[test]
    fn test_stats_skip_empty_counts() {
        console::set_colors_enabled(false);

        let mut full = stats(4, 4);
        full.total_leases = 0;
        let output = Compact::new().format_stats(&[full]).unwrap();
        assert_eq!(
            output,
            "[residential] 4/4 available · 4 endpoints · 0 active leases\n"
        );
    }

    #[test]
    fn test_health() {
        console::set_colors_enabled(false);

        let result = HealthCheckResult {
            endpoint_id: EndpointId::new(),
            status: EndpointStatus::Slow,
            latency: Duration::from_millis(2500),
            protocol: Protocol::Http,
            attempts: 1,
            status_code: Some(200),
            checked_at: Utc::now(),
            error_message: None,
        };
        let report = HealthReport {
            result,
            endpoint: "http://10.0.0.1:8080".into(),
        };

        let output = Compact::new().format_health(&[report]).unwrap();
        assert_eq!(
            output,
            "[slow] http://10.0.0.1:8080 HTTP 200 (2s 500ms in 1 attempt(s))\n1/1 endpoints healthy\n"
        );
    }
}
