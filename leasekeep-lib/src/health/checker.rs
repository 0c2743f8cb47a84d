use futures::StreamExt;
use log::{info, warn};
use std::sync::Arc;

use super::{HealthCheckOptions, HealthCheckResult, HttpProbe, Probe};
use crate::storage::Storage;
use crate::{Endpoint, Result};

/// Default number of endpoints probed at the same time
const DEFAULT_CONCURRENCY: usize = 16;

/// Probes the endpoints of a pool and records the results in the ledger
#[derive(Debug, Clone)]
pub struct HealthChecker {
    storage: Arc<dyn Storage>,
    probe: Arc<dyn Probe>,
    options: HealthCheckOptions,
    concurrency: usize,
}

impl HealthChecker {
    /// Create a checker which probes over HTTP
    ///
    /// # Errors
    ///
    /// Fails if `options` don't pass [`HealthCheckOptions::validate`].
    pub fn new(storage: Arc<dyn Storage>, options: HealthCheckOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            storage,
            probe: Arc::new(HttpProbe),
            options,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Use a different probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    /// Probe at most `concurrency` endpoints at once (at least one)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The options every probe runs with
    #[must_use]
    pub const fn options(&self) -> &HealthCheckOptions {
        &self.options
    }

    /// Probe one endpoint and record the result
    ///
    /// # Errors
    ///
    /// Fails if the probe could not be set up, in which case nothing is
    /// recorded.
    pub async fn check_endpoint(&self, endpoint: &Endpoint) -> Result<HealthCheckResult> {
        let result = self.probe.probe(endpoint, &self.options).await?;

        if result.status != endpoint.status {
            info!(
                "Endpoint {endpoint} changed from {} to {}",
                endpoint.status, result.status
            );
        }
        self.storage
            .apply_health_result(endpoint.id, result.status, result.checked_at);
        Ok(result)
    }

    /// Probe every endpoint of a pool concurrently.
    ///
    /// Endpoints which cannot be probed at all are recorded as `inactive`,
    /// with the reason in [`HealthCheckResult::error_message`]. Results come
    /// back in completion order. Unknown pools yield no results.
    pub async fn check_pool(&self, pool_name: &str) -> Vec<HealthCheckResult> {
        let endpoints = self.storage.endpoints(pool_name);

        futures::stream::iter(endpoints)
            .map(|endpoint| async move {
                match self.check_endpoint(&endpoint).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Cannot check endpoint {endpoint}: {e}");
                        let result = HealthCheckResult {
                            error_message: Some(e.to_string()),
                            ..HealthCheckResult::unreachable(&endpoint, self.options.timeout)
                        };
                        self.storage.apply_health_result(
                            endpoint.id,
                            result.status,
                            result.checked_at,
                        );
                        result
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::test_utils::{active_endpoint, seeded_pool};
    use crate::{EndpointStatus, ErrorKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reports a fixed status per port, and fails for port 1
    #[derive(Debug, Default)]
    struct ScriptedProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(
            &self,
            endpoint: &Endpoint,
            _options: &HealthCheckOptions,
        ) -> Result<HealthCheckResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = match endpoint.port {
                1 => return Err(ErrorKind::InvalidPort),
                8000 => EndpointStatus::Slow,
                8080 => EndpointStatus::Active,
                _ => EndpointStatus::Inactive,
            };
            Ok(HealthCheckResult {
                status,
                status_code: Some(200),
                attempts: 1,
                latency: Duration::from_millis(10),
                checked_at: Utc::now(),
                ..HealthCheckResult::unreachable(endpoint, Duration::ZERO)
            })
        }
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let options = HealthCheckOptions {
            attempts: 0,
            ..HealthCheckOptions::default()
        };
        let result = HealthChecker::new(Arc::new(InMemoryStorage::new()), options);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_check_pool_updates_statuses() {
        let storage = Arc::new(InMemoryStorage::new());
        let (pool, _) = seeded_pool(storage.as_ref(), "p", &[]);
        for port in [8080, 8000, 9999, 1] {
            let mut endpoint = active_endpoint(pool.id);
            endpoint.port = port;
            storage.add_endpoint(endpoint).unwrap();
        }

        let probe = Arc::new(ScriptedProbe::default());
        let checker = HealthChecker::new(storage.clone(), HealthCheckOptions::default())
            .unwrap()
            .with_probe(probe.clone())
            .with_concurrency(2);

        let results = checker.check_pool("p").await;
        assert_eq!(results.len(), 4);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);

        let status_of = |port: u16| {
            storage
                .endpoints("p")
                .into_iter()
                .find(|e| e.port == port)
                .map(|e| e.status)
        };
        assert_eq!(status_of(8080), Some(EndpointStatus::Active));
        assert_eq!(status_of(8000), Some(EndpointStatus::Slow));
        assert_eq!(status_of(9999), Some(EndpointStatus::Inactive));
        assert_eq!(status_of(1), Some(EndpointStatus::Inactive));

        let failed = results
            .iter()
            .find(|r| r.error_message.is_some())
            .unwrap();
        assert_eq!(failed.status, EndpointStatus::Inactive);
    }

    #[tokio::test]
    async fn test_check_unknown_pool() {
        let checker =
            HealthChecker::new(Arc::new(InMemoryStorage::new()), HealthCheckOptions::default())
                .unwrap()
                .with_probe(Arc::new(ScriptedProbe::default()));
        assert!(checker.check_pool("nope").await.is_empty());
    }
}
