use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::scope,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use seqforge::{
    ClientPoolRegistry, ClockSequence, ClockSequenceConfig, CounterSequence, Endpoint, Error, IdGenerator,
    IdWidth, MemoryConnector, MemoryStore, PoolConfig, PoolHandle, RegistryConfig, SequenceGenerator,
    TimeSource, extract_timestamp64,
};

fn counter_over(store: &MemoryStore, config: PoolConfig) -> IdGenerator {
    let registry = ClientPoolRegistry::with_config(
        MemoryConnector::new(store.clone()),
        RegistryConfig::default().with_sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    IdGenerator::counter(PoolHandle::new(registry, Endpoint::default(), config))
}

struct ManualClock(AtomicU64);

impl TimeSource for ManualClock {
    fn current_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn wall_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

#[test]
fn fresh_namespace_counts_from_one() {
    let ids = counter_over(&MemoryStore::new(), PoolConfig::default());
    assert_eq!(ids.current_id("orders").unwrap(), 0);
    assert_eq!(ids.next_id("orders").unwrap(), 1);
    assert_eq!(ids.current_id("orders").unwrap(), 1);
    assert_eq!(ids.next_id("orders").unwrap(), 2);
    assert_eq!(ids.current_id("orders").unwrap(), 2);
}

#[test]
fn namespaces_are_independent() {
    let ids = counter_over(&MemoryStore::new(), PoolConfig::default());
    assert_eq!(ids.next_id("orders").unwrap(), 1);
    assert_eq!(ids.next_id("invoices").unwrap(), 1);
    assert_eq!(ids.next_id("orders").unwrap(), 2);
}

#[test]
fn set_value_overrides_the_counter() {
    let ids = counter_over(&MemoryStore::new(), PoolConfig::default());
    ids.next_id("orders").unwrap();
    assert!(ids.set_value("orders", 1000));
    assert_eq!(ids.current_id("orders").unwrap(), 1000);
    assert_eq!(ids.next_id("orders").unwrap(), 1001);
}

#[test]
fn concurrent_callers_get_every_value_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let ids = counter_over(&MemoryStore::new(), PoolConfig::default().with_max_active(4));
    let issued: Vec<i64> = scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let ids = ids.clone();
                s.spawn(move || {
                    let mut seen = Vec::with_capacity(PER_THREAD);
                    let mut last = 0;
                    for _ in 0..PER_THREAD {
                        let id = ids.next_id("orders").unwrap();
                        assert!(id > last, "per-thread order broken: {id} after {last}");
                        last = id;
                        seen.push(id);
                    }
                    seen
                })
            })
            .collect();
        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    let total = (THREADS * PER_THREAD) as i64;
    let unique: HashSet<i64> = issued.iter().copied().collect();
    assert_eq!(issued.len(), unique.len());
    assert_eq!(unique, (1..=total).collect());
}

#[test]
fn pool_bound_fails_with_exhaustion() {
    let store = MemoryStore::new();
    let registry = ClientPoolRegistry::with_config(
        MemoryConnector::new(store),
        RegistryConfig::default().with_sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    let handle = PoolHandle::new(
        registry,
        Endpoint::default(),
        PoolConfig::default().with_max_active(2).with_max_wait_ms(50),
    );
    let counter = CounterSequence::new(handle.clone());

    let first = handle.borrow().unwrap();
    let second = handle.borrow().unwrap();
    match counter.next_id("orders") {
        Err(Error::PoolExhausted { waited_ms }) => assert!(waited_ms >= 50),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(counter.next_id_or_negative("orders") < 0);

    drop(first);
    assert_eq!(counter.next_id("orders").unwrap(), 1);
    drop(second);
}

#[test]
fn unreachable_store_is_reported() {
    let store = MemoryStore::new();
    let ids = counter_over(&store, PoolConfig::default());
    assert_eq!(ids.next_id("orders").unwrap(), 1);

    store.set_available(false);
    let err = ids.next_id("orders").unwrap_err();
    assert!(err.is_backend_unavailable());
    assert!(err.is_retryable());
    assert!(ids.current_id("orders").is_err());
    assert!(!ids.set_value("orders", 5));
    assert_eq!(ids.next_id_or_negative("orders"), -1);

    store.set_available(true);
    assert_eq!(ids.next_id("orders").unwrap(), 2);
}

#[test]
fn malformed_namespaces_are_rejected_before_io() {
    let store = MemoryStore::new();
    let ids = counter_over(&store, PoolConfig::default());
    for bad in ["", "two words", "tab\there", "line\nbreak"] {
        assert!(matches!(ids.next_id(bad), Err(Error::InvalidNamespace { .. })), "{bad:?}");
    }
    assert!(matches!(
        ids.next_id(&"x".repeat(513)),
        Err(Error::InvalidNamespace { .. })
    ));
    assert_eq!(store.connections_opened(), 0);
}

#[test]
fn clock_regression_is_an_error() {
    let base = 1_700_000_000_000;
    let time = Arc::new(ManualClock(AtomicU64::new(base)));
    let clock = ClockSequence::with_time(ClockSequenceConfig::new(1), Arc::clone(&time)).unwrap();
    clock.generate_id64().unwrap();

    time.0.store(base - 10, Ordering::SeqCst);
    assert!(matches!(
        clock.generate_id64(),
        Err(Error::ClockRegression { last_ms, now_ms }) if last_ms == base && now_ms == base - 10
    ));
    assert!(matches!(
        clock.next_id("orders"),
        Err(Error::ClockRegression { .. })
    ));
}

#[test]
fn same_millisecond_ids_differ_in_sequence_only() {
    let time = ManualClock(AtomicU64::new(1_700_000_000_000));
    let clock = ClockSequence::with_time(ClockSequenceConfig::new(9), time).unwrap();
    for width in IdWidth::ALL {
        let a = clock.generate(width).unwrap();
        let b = clock.generate(width).unwrap();
        assert_eq!(a.timestamp(), b.timestamp(), "{width}");
        assert_eq!(a.node_id(), b.node_id(), "{width}");
        assert_eq!(b.sequence(), a.sequence() + 1, "{width}");
    }
}

#[test]
fn extracted_timestamp_matches_the_wall_clock() {
    let clock = ClockSequence::new(3).unwrap();
    let before = wall_millis();
    let id = clock.generate_id64().unwrap();
    let after = wall_millis();

    let at = extract_timestamp64(id);
    assert!(before <= at && at <= after, "{before} <= {at} <= {after}");
    assert!(ClockSequence::new(1).unwrap().next_id("orders").unwrap() > 0);
}

#[test]
#[ignore = "needs a Redis server at REDIS_HOST:REDIS_PORT"]
#[cfg(feature = "redis")]
fn counter_over_live_redis() {
    use seqforge::RedisConnector;

    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379);
    let registry = ClientPoolRegistry::new(RedisConnector::default()).unwrap();
    let ids = IdGenerator::counter(PoolHandle::new(
        registry,
        Endpoint::new(host, port),
        PoolConfig::default(),
    ));

    let namespace = format!("seqforge-test-{}", wall_millis());
    assert_eq!(ids.current_id(&namespace).unwrap(), 0);
    assert_eq!(ids.next_id(&namespace).unwrap(), 1);
    assert!(ids.set_value(&namespace, 1000));
    assert_eq!(ids.next_id(&namespace).unwrap(), 1001);
}
