//! Behavior every [`Storage`] backend has to show.
//!
//! A backend runs the whole suite from its own tests by handing over a
//! constructor which takes the clock to read time from:
//!
//! ```ignore
//! #[test]
//! fn test_storage_contract() {
//!     leasekeep_lib::storage::contract::run(MyStorage::with_clock);
//! }
//! ```
//!
//! Every check starts from a fresh backend and a [`ManualClock`], so expiry
//! is exercised without sleeping. Failures panic like any other assertion.
//! Outside of this crate the module needs the `contract-tests` feature.

use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::Storage;
use crate::{
    Clock, Consumer, ConsumerId, Endpoint, EndpointId, EndpointStatus, ErrorKind, Filter, LeaseId,
    LeaseStatus, ManualClock, Pool, Selector,
};

const TTL: Duration = Duration::from_secs(60);

/// Run every check against backends built by `make`
///
/// # Panics
///
/// Panics on the first check the backend fails.
pub fn run<S, F>(make: F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    consumers_round_trip(&make);
    finds_active_endpoint(&make);
    filters_by_attributes(&make);
    composite_filters(&make);
    filters_by_distance(&make);
    enforces_concurrency_limit(&make);
    least_loaded_prefers_idle_endpoint(&make);
    round_robin_cycles(&make);
    lease_release_cycle(&make);
    rejects_zero_duration(&make);
    reaps_expired_leases(&make);
    applies_health_results(&make);
    reports_pool_stats(&make);
}

fn fresh<S, F>(make: &F) -> (S, Arc<ManualClock>)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let clock = Arc::new(ManualClock::default());
    let shared: Arc<dyn Clock> = clock.clone();
    (make(shared), clock)
}

fn pool(storage: &impl Storage, name: &str) -> Pool {
    storage.add_pool(Pool::new(name)).unwrap()
}

fn endpoint(pool: &Pool, port: u16) -> Endpoint {
    Endpoint::builder()
        .pool_id(pool.id)
        .host("10.0.0.1")
        .port(port)
        .status(EndpointStatus::Active)
        .build()
}

fn add(storage: &impl Storage, endpoint: Endpoint) -> Endpoint {
    storage.add_endpoint(endpoint).unwrap()
}

fn consumer(storage: &impl Storage) -> ConsumerId {
    storage.ensure_consumer("contract").unwrap()
}

fn find(storage: &impl Storage, pool: &str, filter: &Filter) -> Option<Endpoint> {
    storage.find_available(pool, filter, Selector::FirstEligible)
}

fn consumers_round_trip<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);

    let crawler = storage.add_consumer(Consumer::new("crawler")).unwrap();
    let again = storage.add_consumer(Consumer::new("crawler")).unwrap();
    assert_eq!(again.id, crawler.id, "consumer names are unique");
    assert_eq!(storage.ensure_consumer("crawler").unwrap(), crawler.id);

    let created = storage.ensure_consumer("indexer").unwrap();
    assert_ne!(created, crawler.id);
    assert_eq!(storage.ensure_consumer("indexer").unwrap(), created);
}

fn finds_active_endpoint<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");

    let mut down = endpoint(&residential, 8080);
    down.status = EndpointStatus::Inactive;
    add(&storage, down);
    let mut slow = endpoint(&residential, 8081);
    slow.status = EndpointStatus::Slow;
    add(&storage, slow);
    let up = add(&storage, endpoint(&residential, 8082));

    let found = find(&storage, "residential", &Filter::default()).map(|e| e.id);
    assert_eq!(found, Some(up.id), "only active endpoints are eligible");
    assert!(find(&storage, "unknown", &Filter::default()).is_none());

    let registered: Vec<u16> = storage
        .endpoints("residential")
        .iter()
        .map(|e| e.port)
        .collect();
    assert_eq!(registered, vec![8080, 8081, 8082], "insertion order is kept");
}

fn filters_by_attributes<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");

    let mut argentina = endpoint(&residential, 8080);
    argentina.country = Some("AR".into());
    argentina.city = Some("Buenos Aires".into());
    argentina.asn = Some(7303);
    let argentina = add(&storage, argentina);

    let mut chile = endpoint(&residential, 8081);
    chile.country = Some("CL".into());
    chile.isp = Some("Movistar".into());
    chile.source = Some("vendor-b".into());
    let chile = add(&storage, chile);

    let by = |filter: Filter| find(&storage, "residential", &filter).map(|e| e.id);

    assert_eq!(by(Filter::builder().country("CL").build().unwrap()), Some(chile.id));
    assert_eq!(by(Filter::builder().city("Buenos Aires").build().unwrap()), Some(argentina.id));
    assert_eq!(by(Filter::builder().asn(7303).build().unwrap()), Some(argentina.id));
    assert_eq!(by(Filter::builder().isp("Movistar").build().unwrap()), Some(chile.id));
    assert_eq!(by(Filter::builder().source("vendor-b").build().unwrap()), Some(chile.id));
    assert_eq!(by(Filter::builder().country("BR").build().unwrap()), None);
    assert_eq!(
        by(Filter::builder().country("AR").isp("Movistar").build().unwrap()),
        None,
        "all set fields must match"
    );
}

fn composite_filters<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");

    let mut ids = Vec::new();
    for (port, country) in [(8080, "BR"), (8081, "AR"), (8082, "CL")] {
        let mut e = endpoint(&residential, port);
        e.country = Some(country.into());
        ids.push(add(&storage, e).id);
    }
    let (brazil, argentina, chile) = (ids[0], ids[1], ids[2]);

    let country = |code: &str| Filter::builder().country(code).build().unwrap();
    let by = |filter: Filter| find(&storage, "residential", &filter).map(|e| e.id);

    let any = Filter::builder()
        .any_of([country("CL"), country("AR")])
        .build()
        .unwrap();
    assert_eq!(by(any), Some(argentina));

    let none = Filter::builder()
        .none_of([country("BR"), country("AR")])
        .build()
        .unwrap();
    assert_eq!(by(none), Some(chile));

    let contradiction = Filter::builder()
        .all_of([country("BR"), country("CL")])
        .build()
        .unwrap();
    assert_eq!(by(contradiction), None);

    let by_port = Filter::builder()
        .predicate(|e: &Endpoint| e.port == 8082)
        .build()
        .unwrap();
    assert_eq!(by(by_port), Some(chile));

    let nested = Filter::builder()
        .none_of([Filter::builder()
            .any_of([country("AR"), country("CL")])
            .build()
            .unwrap()])
        .build()
        .unwrap();
    assert_eq!(by(nested), Some(brazil));
}

fn filters_by_distance<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let south = pool(&storage, "south");

    let mut santiago = endpoint(&south, 8080);
    santiago.latitude = Some(-33.4489);
    santiago.longitude = Some(-70.6693);
    add(&storage, santiago);

    let mut buenos_aires = endpoint(&south, 8081);
    buenos_aires.latitude = Some(-34.6037);
    buenos_aires.longitude = Some(-58.3816);
    buenos_aires.max_concurrency = Some(1);
    let buenos_aires = add(&storage, buenos_aires);

    // Neither coordinate set, so never near anything
    add(&storage, endpoint(&south, 8082));

    let near = Filter::builder()
        .latitude(-34.6)
        .longitude(-58.38)
        .radius_km(50.0)
        .build()
        .unwrap();
    let found = find(&storage, "south", &near).map(|e| e.id);
    assert_eq!(found, Some(buenos_aires.id));

    storage
        .create_lease(buenos_aires.id, consumer(&storage), TTL)
        .unwrap();
    assert!(
        find(&storage, "south", &near).is_none(),
        "a full endpoint is not replaced by a distant one"
    );
}

fn enforces_concurrency_limit<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");
    let mut limited = endpoint(&residential, 8080);
    limited.max_concurrency = Some(2);
    let limited = add(&storage, limited);
    let consumer = consumer(&storage);

    for _ in 0..2 {
        let found = find(&storage, "residential", &Filter::default()).unwrap();
        storage.create_lease(found.id, consumer, TTL).unwrap();
    }

    assert!(find(&storage, "residential", &Filter::default()).is_none());
    assert_eq!(
        storage.create_lease(limited.id, consumer, TTL).unwrap_err(),
        ErrorKind::CapacityExhausted(limited.id)
    );
    assert_eq!(storage.endpoint(limited.id).unwrap().current_leases, 2);

    let mut down = storage.endpoint(limited.id).unwrap();
    down.id = EndpointId::new();
    down.max_concurrency = None;
    down.status = EndpointStatus::Inactive;
    let down = add(&storage, down);
    assert!(
        storage
            .create_lease(down.id, consumer, TTL)
            .unwrap_err()
            .is_conflict(),
        "inactive endpoints cannot be leased directly either"
    );

    let unknown = EndpointId::new();
    assert_eq!(
        storage.create_lease(unknown, consumer, TTL).unwrap_err(),
        ErrorKind::UnknownEndpoint(unknown)
    );
    let stranger = ConsumerId::new();
    assert_eq!(
        storage.create_lease(down.id, stranger, TTL).unwrap_err(),
        ErrorKind::UnknownConsumer(stranger)
    );
}

fn least_loaded_prefers_idle_endpoint<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");
    let consumer = consumer(&storage);

    let mut busy = endpoint(&residential, 8080);
    busy.max_concurrency = Some(5);
    let busy = add(&storage, busy);
    let mut idle = endpoint(&residential, 8081);
    idle.max_concurrency = Some(5);
    let idle = add(&storage, idle);

    for _ in 0..2 {
        storage.create_lease(busy.id, consumer, TTL).unwrap();
    }
    let least = |storage: &S| {
        storage
            .find_available("residential", &Filter::default(), Selector::LeastLoaded)
            .map(|e| e.id)
    };
    assert_eq!(least(&storage), Some(idle.id));

    for _ in 0..3 {
        storage.create_lease(idle.id, consumer, TTL).unwrap();
    }
    assert_eq!(least(&storage), Some(busy.id));
}

fn round_robin_cycles<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");
    let other = pool(&storage, "datacenter");
    add(&storage, endpoint(&other, 9090));

    let mut ids: Vec<_> = (8080..8083)
        .map(|port| add(&storage, endpoint(&residential, port)).id)
        .collect();
    ids.sort();

    let mut picks = Vec::new();
    for _ in 0..5 {
        let next = storage
            .find_available("residential", &Filter::default(), Selector::RoundRobin)
            .unwrap();
        picks.push(next.id);
        // Another pool's rotation must not disturb this one
        storage.find_available("datacenter", &Filter::default(), Selector::RoundRobin);
    }
    assert_eq!(picks, vec![ids[0], ids[1], ids[2], ids[0], ids[1]]);
}

fn lease_release_cycle<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, clock) = fresh(make);
    let residential = pool(&storage, "residential");
    let mut single = endpoint(&residential, 8080);
    single.max_concurrency = Some(1);
    let single = add(&storage, single);
    let consumer = consumer(&storage);

    let lease = storage.create_lease(single.id, consumer, TTL).unwrap();
    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(lease.endpoint_id, single.id);
    assert_eq!(lease.consumer_id, consumer);
    assert_eq!(lease.pool_id, residential.id);
    assert_eq!(lease.pool_name, "residential");
    assert_eq!(lease.acquired_at, clock.now());
    assert_eq!(lease.expires_at - lease.acquired_at, TimeDelta::seconds(60));
    assert_eq!(storage.lease(lease.id).map(|l| l.status), Some(LeaseStatus::Active));
    assert_eq!(storage.endpoint(single.id).unwrap().current_leases, 1);

    clock.advance(Duration::from_secs(5));
    let released = storage.release_lease(lease.id).unwrap().unwrap();
    assert_eq!(released.status, LeaseStatus::Released);
    assert_eq!(released.released_at, Some(clock.now()));
    assert_eq!(storage.endpoint(single.id).unwrap().current_leases, 0);

    assert!(storage.release_lease(lease.id).unwrap().is_none(), "release is idempotent");
    assert!(storage.release_lease(LeaseId::new()).unwrap().is_none());
    assert_eq!(storage.endpoint(single.id).unwrap().current_leases, 0);
    assert_eq!(
        storage.lease(lease.id).map(|l| l.status),
        Some(LeaseStatus::Released),
        "released leases stay readable"
    );
    assert!(find(&storage, "residential", &Filter::default()).is_some());
}

fn rejects_zero_duration<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, _) = fresh(make);
    let residential = pool(&storage, "residential");
    let e = add(&storage, endpoint(&residential, 8080));

    assert_eq!(
        storage
            .create_lease(e.id, consumer(&storage), Duration::ZERO)
            .unwrap_err(),
        ErrorKind::InvalidDuration(Duration::ZERO)
    );
    assert_eq!(storage.endpoint(e.id).unwrap().current_leases, 0);
}

fn reaps_expired_leases<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, clock) = fresh(make);
    let residential = pool(&storage, "residential");
    let mut single = endpoint(&residential, 8080);
    single.max_concurrency = Some(1);
    let single = add(&storage, single);
    let consumer = consumer(&storage);

    let short = storage.create_lease(single.id, consumer, TTL).unwrap();
    assert_eq!(storage.reap_expired().unwrap(), 0);

    clock.advance(TTL);
    assert_eq!(storage.reap_expired().unwrap(), 1, "expiry is inclusive");
    assert_eq!(storage.reap_expired().unwrap(), 0);
    assert_eq!(storage.endpoint(single.id).unwrap().current_leases, 0);

    let reaped = storage.lease(short.id).unwrap();
    assert_eq!(reaped.status, LeaseStatus::Released);
    assert_eq!(reaped.released_at, Some(clock.now()));
    assert!(storage.release_lease(short.id).unwrap().is_none());

    let long = storage
        .create_lease(single.id, consumer, TTL * 10)
        .unwrap();
    clock.advance(TTL);
    assert_eq!(storage.reap_expired().unwrap(), 0);
    assert_eq!(storage.lease(long.id).map(|l| l.status), Some(LeaseStatus::Active));
}

fn applies_health_results<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, clock) = fresh(make);
    let residential = pool(&storage, "residential");
    let e = add(&storage, endpoint(&residential, 8080));
    storage.create_lease(e.id, consumer(&storage), TTL).unwrap();

    clock.advance(Duration::from_secs(30));
    let checked_at = clock.now();
    let updated = storage
        .apply_health_result(e.id, EndpointStatus::Inactive, checked_at)
        .unwrap();
    assert_eq!(updated.status, EndpointStatus::Inactive);
    assert_eq!(updated.checked_at, checked_at);
    assert_eq!(updated.current_leases, 1, "only status and check time change");
    assert_eq!(updated.port, 8080);
    assert!(find(&storage, "residential", &Filter::default()).is_none());

    storage.apply_health_result(e.id, EndpointStatus::Active, checked_at);
    assert!(find(&storage, "residential", &Filter::default()).is_some());

    let unknown = EndpointId::new();
    assert!(
        storage
            .apply_health_result(unknown, EndpointStatus::Active, checked_at)
            .is_none()
    );
}

fn reports_pool_stats<S, F>(make: &F)
where
    S: Storage,
    F: Fn(Arc<dyn Clock>) -> S,
{
    let (storage, clock) = fresh(make);
    let residential = pool(&storage, "residential");
    let consumer = consumer(&storage);

    let mut full = endpoint(&residential, 8080);
    full.max_concurrency = Some(1);
    let full = add(&storage, full);
    let mut shared = endpoint(&residential, 8081);
    shared.max_concurrency = Some(3);
    let shared = add(&storage, shared);
    let mut down = endpoint(&residential, 8082);
    down.status = EndpointStatus::Inactive;
    add(&storage, down);

    storage.create_lease(full.id, consumer, TTL).unwrap();
    storage.create_lease(shared.id, consumer, TTL).unwrap();
    storage.create_lease(shared.id, consumer, TTL).unwrap();

    let stats = storage.pool_stats("residential").unwrap();
    assert_eq!(stats.pool_name, "residential");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.available, 1);
    assert_eq!(stats.leased, 2);
    assert_eq!(stats.total_leases, 3);
    assert_eq!(stats.collected_at, clock.now());

    assert!(storage.pool_stats("unknown").is_none());
    let empty = pool(&storage, "empty");
    let stats = storage.pool_stats(&empty.name).unwrap();
    assert_eq!((stats.total, stats.available, stats.total_leases), (0, 0, 0));
}
