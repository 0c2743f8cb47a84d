use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::redirect::Policy;
use std::fmt::Debug;
use std::time::Instant;

use super::{HealthCheckOptions, HealthCheckResult};
use crate::{Endpoint, EndpointStatus, ErrorKind, Result};

/// Measures whether an endpoint is usable.
///
/// Implementations report unreachable endpoints as an `inactive`
/// [`HealthCheckResult`]. Errors are reserved for cases where no check could
/// be attempted at all, e.g. because the endpoint's URL is malformed.
#[async_trait]
pub trait Probe: Debug + Send + Sync {
    /// Check a single endpoint
    ///
    /// # Errors
    ///
    /// Fails if the check cannot be set up for this endpoint.
    async fn probe(&self, endpoint: &Endpoint, options: &HealthCheckOptions)
    -> Result<HealthCheckResult>;
}

/// Sends a GET request for [`HealthCheckOptions::target_url`] through the
/// endpoint, which acts as the HTTP client's proxy
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProbe;

impl HttpProbe {
    fn client(endpoint: &Endpoint, options: &HealthCheckOptions) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(endpoint.url()).map_err(|source| {
            ErrorKind::InvalidProxyUrl {
                endpoint: endpoint.id,
                source,
            }
        })?;

        let redirect = if options.allow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        reqwest::ClientBuilder::new()
            .proxy(proxy)
            .default_headers(options.headers.clone())
            .timeout(options.timeout)
            .redirect(redirect)
            .build()
            .map_err(|source| ErrorKind::BuildProbeClient {
                endpoint: endpoint.id,
                source,
            })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        options: &HealthCheckOptions,
    ) -> Result<HealthCheckResult> {
        let client = Self::client(endpoint, options)?;
        let mut result = HealthCheckResult::unreachable(endpoint, options.timeout);

        for attempt in 1..=options.attempts.max(1) {
            let start = Instant::now();
            let response = client.get(options.target_url.as_str()).send().await;
            let latency = start.elapsed();

            result = match response {
                Ok(response) => {
                    let code = response.status().as_u16();
                    let status = if !options.is_expected(code) {
                        EndpointStatus::Inactive
                    } else if latency > options.slow_threshold {
                        EndpointStatus::Slow
                    } else {
                        EndpointStatus::Active
                    };
                    HealthCheckResult {
                        status,
                        latency,
                        attempts: attempt,
                        status_code: Some(code),
                        checked_at: Utc::now(),
                        error_message: (status == EndpointStatus::Inactive)
                            .then(|| format!("Unexpected status code {code}")),
                        ..result
                    }
                }
                Err(e) => HealthCheckResult {
                    status: EndpointStatus::Inactive,
                    latency,
                    attempts: attempt,
                    status_code: None,
                    checked_at: Utc::now(),
                    error_message: Some(e.to_string()),
                    ..result
                },
            };

            debug!(
                "Probe {attempt}/{} of {endpoint}: {} in {latency:?}",
                options.attempts, result.status
            );
            if result.is_healthy() {
                break;
            }
        }

        Ok(result)
    }
}
