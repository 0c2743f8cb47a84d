#![allow(unreachable_pub)]

mod endpoint;
mod error;
mod ids;
mod lease;
mod pool;

pub use endpoint::{Credentials, Endpoint, EndpointStatus, Protocol};
pub use error::ErrorKind;
pub use ids::{ConsumerId, EndpointId, LeaseId, PoolId};
pub use lease::{Lease, LeaseStatus};
pub(crate) use lease::to_time_delta;
pub use pool::{Consumer, Pool, PoolStats};

/// The leasekeep `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
