//! `leasekeep` hands out time-bounded leases on shared network endpoints
//! (usually proxies) grouped into named pools.
//!
//! It enforces a concurrency limit per endpoint, selects endpoints by
//! attributes such as country or distance, and reclaims leases whose time
//! is up. Nothing is proxied through the library: it only tracks who may
//! use which endpoint, and until when.
//!
//! ```
//! use leasekeep_lib::{AcquireRequest, Filter, InMemoryStorage, LeaseManager, Result, Selector};
//! use leasekeep_lib::bootstrap::SeedConfig;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let storage = Arc::new(InMemoryStorage::new());
//!     SeedConfig::from_toml(
//!         r#"
//!         [[pools]]
//!         name = "datacenter"
//!
//!         [[pools.endpoints]]
//!         host = "10.0.0.1"
//!         port = 3128
//!         country = "DE"
//!         max_concurrency = 1
//!         "#,
//!     )?
//!     .apply(storage.as_ref())?;
//!
//!     let manager = LeaseManager::new(storage);
//!     let request = AcquireRequest::builder()
//!         .pool("datacenter")
//!         .consumer("crawler")
//!         .filter(Filter::builder().country("DE").build()?)
//!         .selector(Selector::LeastLoaded)
//!         .build();
//!
//!     manager.with_lease(&request, |lease| {
//!         let lease = lease.expect("one endpoint is free");
//!         println!("{} until {}", lease.endpoint_id, lease.expires_at);
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! Async programs use [`AsyncLeaseManager`], which keeps the blocking ledger
//! off the executor threads.
// #![deny(missing_docs)]

mod asynchronous;
mod clock;
mod config;
mod filter;
mod manager;
mod retry;
mod selector;
mod types;

pub mod bootstrap;
pub mod health;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

pub use asynchronous::AsyncLeaseManager;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_CONSUMER, DEFAULT_LEASE_DURATION, LeaseConfig};
pub use filter::{
    EARTH_RADIUS_KM, Filter, FilterBuilder, FilterConfig, GeoConstraint, GeoPoint, Predicate,
};
pub use manager::{
    AcquireEvent, AcquireRequest, LeaseGuard, LeaseManager, LeaseObserver, LogObserver,
    ReleaseEvent,
};
pub use retry::RetryPolicy;
pub use selector::Selector;
pub use storage::{InMemoryStorage, Storage};
pub use types::*;
