//! Helpers for seeding a [`Storage`] with pools, endpoints and consumers.
//!
//! The single-record helpers are meant for tests and small programs. For
//! larger setups, describe the records in a TOML [`SeedConfig`]:
//!
//! ```toml
//! [[consumers]]
//! name = "crawler"
//!
//! [[pools]]
//! name = "residential"
//!
//! [[pools.endpoints]]
//! host = "10.0.0.1"
//! port = 1080
//! protocol = "socks5"
//! max_concurrency = 2
//! country = "AR"
//! ```

use log::{debug, info};
use serde::Deserialize;

use crate::storage::Storage;
use crate::{Consumer, Credentials, Endpoint, EndpointStatus, Pool, Protocol, Result};

/// Name of the consumer created by [`default_consumer`]
pub const DEFAULT_CONSUMER_NAME: &str = "default-consumer";

/// Name of the pool created by [`default_pool`]
pub const DEFAULT_POOL_NAME: &str = "default-pool";

/// Register a consumer, or return the one already registered under `name`
///
/// # Errors
///
/// Fails if the storage rejects the record.
pub fn consumer(storage: &dyn Storage, name: &str) -> Result<Consumer> {
    storage.add_consumer(Consumer::new(name))
}

/// Register the consumer named [`DEFAULT_CONSUMER_NAME`]
///
/// # Errors
///
/// Fails if the storage rejects the record.
pub fn default_consumer(storage: &dyn Storage) -> Result<Consumer> {
    consumer(storage, DEFAULT_CONSUMER_NAME)
}

/// Register a pool, or return the one already registered under `name`
///
/// # Errors
///
/// Fails if the storage rejects the record.
pub fn pool(storage: &dyn Storage, name: &str) -> Result<Pool> {
    storage.add_pool(Pool::new(name))
}

/// Register the pool named [`DEFAULT_POOL_NAME`]
///
/// # Errors
///
/// Fails if the storage rejects the record.
pub fn default_pool(storage: &dyn Storage) -> Result<Pool> {
    pool(storage, DEFAULT_POOL_NAME)
}

/// Register an active HTTP endpoint with unbounded capacity in `pool`.
/// Use [`Storage::add_endpoint`] directly for anything more specific.
///
/// # Errors
///
/// Fails if the port is 0 or the pool is unknown to the storage.
pub fn endpoint(
    storage: &dyn Storage,
    pool: &Pool,
    host: impl Into<String>,
    port: u16,
) -> Result<Endpoint> {
    storage.add_endpoint(
        Endpoint::builder()
            .pool_id(pool.id)
            .host(host)
            .port(port)
            .protocol(Protocol::Http)
            .status(EndpointStatus::Active)
            .build(),
    )
}

/// Contents of a seed file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedConfig {
    /// Consumers to register
    #[serde(default)]
    pub consumers: Vec<SeedConsumer>,
    /// Pools to register, with their endpoints
    #[serde(default)]
    pub pools: Vec<SeedPool>,
}

/// A consumer in a seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedConsumer {
    /// Unique name
    pub name: String,
}

/// A pool in a seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedPool {
    /// Unique name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Member endpoints
    #[serde(default)]
    pub endpoints: Vec<SeedEndpoint>,
}

/// An endpoint in a seed file. Seeded endpoints are `active` unless stated
/// otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedEndpoint {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Protocol spoken by the endpoint
    #[serde(default)]
    pub protocol: Protocol,
    /// Initial status
    #[serde(default = "seed_status")]
    pub status: EndpointStatus,
    /// Optional authentication
    pub credentials: Option<Credentials>,
    /// Maximum number of concurrent leases
    pub max_concurrency: Option<u32>,
    /// Source tag
    pub source: Option<String>,
    /// Country tag
    pub country: Option<String>,
    /// City tag
    pub city: Option<String>,
    /// ISP tag
    pub isp: Option<String>,
    /// Autonomous system number
    pub asn: Option<u32>,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
}

const fn seed_status() -> EndpointStatus {
    EndpointStatus::Active
}

impl SeedEndpoint {
    /// Endpoints are told apart by address and protocol
    fn describes(&self, endpoint: &Endpoint) -> bool {
        self.host == endpoint.host
            && self.port == endpoint.port
            && self.protocol == endpoint.protocol
    }

    fn into_endpoint(self, pool: &Pool) -> Endpoint {
        let mut endpoint = Endpoint::builder()
            .pool_id(pool.id)
            .host(self.host)
            .port(self.port)
            .protocol(self.protocol)
            .status(self.status)
            .build();
        endpoint.credentials = self.credentials;
        endpoint.max_concurrency = self.max_concurrency;
        endpoint.source = self.source;
        endpoint.country = self.country;
        endpoint.city = self.city;
        endpoint.isp = self.isp;
        endpoint.asn = self.asn;
        endpoint.latitude = self.latitude;
        endpoint.longitude = self.longitude;
        endpoint
    }
}

/// What [`SeedConfig::apply`] newly registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Number of pools
    pub pools: usize,
    /// Number of endpoints
    pub endpoints: usize,
    /// Number of consumers
    pub consumers: usize,
}

impl SeedConfig {
    /// Parse a seed file
    ///
    /// # Errors
    ///
    /// Fails with [`crate::ErrorKind::SeedParse`] on malformed input.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Register everything in `storage`.
    ///
    /// Applying the same seed again is a no-op. Pools and consumers are
    /// matched by name, endpoints by host, port and protocol within their
    /// pool, and records which already exist are left untouched.
    ///
    /// Records are added one at a time; if one is rejected, the ones
    /// before it stay registered.
    ///
    /// # Errors
    ///
    /// Fails on the first record the storage rejects.
    pub fn apply(self, storage: &dyn Storage) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for seed in self.consumers {
            let candidate = Consumer::new(seed.name);
            let id = candidate.id;
            if storage.add_consumer(candidate)?.id == id {
                summary.consumers += 1;
            }
        }

        for seed in self.pools {
            let mut candidate = Pool::new(seed.name);
            if let Some(description) = seed.description {
                candidate = candidate.with_description(description);
            }
            let id = candidate.id;
            let pool = storage.add_pool(candidate)?;
            if pool.id == id {
                summary.pools += 1;
            }

            let mut known = storage.endpoints(&pool.name);
            for endpoint in seed.endpoints {
                if known.iter().any(|e| endpoint.describes(e)) {
                    debug!(
                        "Skipping {}:{} in pool {}, already registered",
                        endpoint.host, endpoint.port, pool.name
                    );
                    continue;
                }
                known.push(storage.add_endpoint(endpoint.into_endpoint(&pool))?);
                summary.endpoints += 1;
            }
        }

        info!(
            "Seeded {} pool(s), {} endpoint(s) and {} consumer(s)",
            summary.pools, summary.endpoints, summary.consumers
        );
        Ok(summary)
    }
}
