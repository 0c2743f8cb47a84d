use crate::storage::Storage;
use crate::{Endpoint, EndpointStatus, Pool, PoolId};

/// An active endpoint with unbounded capacity in a fresh, unregistered pool
pub(crate) fn endpoint() -> Endpoint {
    active_endpoint(PoolId::new())
}

/// An active endpoint with unbounded capacity in the given pool
pub(crate) fn active_endpoint(pool_id: PoolId) -> Endpoint {
    Endpoint::builder()
        .pool_id(pool_id)
        .host("10.0.0.1")
        .port(8080)
        .status(EndpointStatus::Active)
        .build()
}

/// Register a pool with one active endpoint per entry of `limits`
///
/// # Panic
///
/// This panics if seeding fails, so it should only be used for testing
pub(crate) fn seeded_pool(
    storage: &dyn Storage,
    name: &str,
    limits: &[Option<u32>],
) -> (Pool, Vec<Endpoint>) {
    let pool = storage.add_pool(Pool::new(name)).unwrap();
    let endpoints = limits
        .iter()
        .map(|limit| {
            let mut endpoint = active_endpoint(pool.id);
            endpoint.max_concurrency = *limit;
            storage.add_endpoint(endpoint).unwrap()
        })
        .collect();
    (pool, endpoints)
}
