use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use super::*;
use crate::{
    ClientPoolRegistry, ClockSequence, ClockSequenceConfig, Endpoint, Error, IdWidth, MemoryConnector,
    MemoryStore, PoolConfig, PoolHandle, RegistryConfig, StoreClient, TimeSource, Ttl,
};

fn handle_over(store: &MemoryStore) -> PoolHandle<MemoryConnector> {
    let registry = ClientPoolRegistry::with_config(
        MemoryConnector::new(store.clone()),
        RegistryConfig::default().with_sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    PoolHandle::new(registry, Endpoint::default(), PoolConfig::default())
}

#[derive(Clone, Default)]
struct StepTime(Arc<AtomicU64>);

impl StepTime {
    fn at(ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(ms)))
    }

    fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for StepTime {
    fn current_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

const BASE: u64 = 1_700_000_000_000;

#[test]
fn counter_keys_carry_the_prefix() {
    let store = MemoryStore::new();
    let counter = CounterSequence::new(handle_over(&store));
    assert_eq!(counter.key_prefix(), DEFAULT_KEY_PREFIX);
    assert_eq!(counter.next_id("orders").unwrap(), 1);

    let mut raw = store.connect().unwrap();
    assert_eq!(raw.get("id:orders").unwrap().as_deref(), Some("1"));

    let custom = CounterSequence::with_key_prefix(handle_over(&store), "seq/");
    assert_eq!(custom.next_id("orders").unwrap(), 1);
    assert_eq!(raw.get("seq/orders").unwrap().as_deref(), Some("1"));
}

#[test]
fn counter_current_id_rejects_non_integers() {
    let store = MemoryStore::new();
    store
        .connect()
        .unwrap()
        .set("id:broken", "twelve", Ttl::Persistent)
        .unwrap();
    let counter = CounterSequence::new(handle_over(&store));

    let err = counter.current_id("broken").unwrap_err();
    assert!(matches!(err, Error::Store(crate::StoreError::InvalidValue { .. })));
    assert!(!err.is_retryable());
    // A data error leaves the client usable and pooled.
    assert_eq!(counter.handle().pool().unwrap().status().idle, 1);
}

#[test]
fn counter_set_value_clears_expiry() {
    let store = MemoryStore::new();
    let mut raw = store.connect().unwrap();
    raw.set("id:tmp", "5", Ttl::Seconds(60)).unwrap();

    let counter = CounterSequence::new(handle_over(&store));
    assert!(counter.set_value("tmp", 9));
    assert_eq!(raw.ttl("id:tmp").unwrap(), crate::KeyTtl::Persistent);
    assert_eq!(counter.next_id("tmp").unwrap(), 10);
}

#[test]
fn counter_set_value_reports_failure() {
    let store = MemoryStore::new();
    let counter = CounterSequence::new(handle_over(&store));
    assert!(!counter.set_value("", 1));
    store.set_available(false);
    assert!(!counter.set_value("orders", 1));
}

#[test]
fn clock_backend_tracks_last_full64() {
    let time = StepTime::at(BASE);
    let clock = ClockSequence::with_time(ClockSequenceConfig::new(3), time.clone()).unwrap();
    assert_eq!(clock.backend(), BackendKind::Clock);
    assert_eq!(clock.current_id("any").unwrap(), 0);

    let a = clock.next_id("orders").unwrap();
    let b = clock.next_id("invoices").unwrap();
    assert_eq!(b, a + 1);
    assert_eq!(clock.current_id("orders").unwrap(), b);

    // Other widths do not move the contract's current value.
    clock.generate(IdWidth::Tiny).unwrap();
    assert_eq!(clock.current_id("orders").unwrap(), b);

    time.set(BASE + 1);
    let c = clock.next_id("orders").unwrap();
    assert!(c > b);
    assert!(!clock.set_value("orders", 1));
    assert_eq!(clock.current_id("orders").unwrap(), c);
}

#[test]
fn clock_backend_validates_namespaces() {
    let clock = ClockSequence::with_time(ClockSequenceConfig::new(0), StepTime::at(BASE)).unwrap();
    assert!(matches!(clock.next_id(" "), Err(Error::InvalidNamespace { .. })));
    assert!(matches!(clock.current_id(""), Err(Error::InvalidNamespace { .. })));
}

#[test]
fn negative_sentinel_on_failure() {
    let time = StepTime::at(BASE);
    let clock = ClockSequence::with_time(ClockSequenceConfig::new(1), time.clone()).unwrap();
    assert!(clock.next_id_or_negative("orders") > 0);
    time.set(BASE - 10);
    assert_eq!(clock.next_id_or_negative("orders"), -1);
    assert_eq!(clock.next_id_or_negative(""), -1);
}

#[test]
fn facade_delegates_to_backend() {
    let store = MemoryStore::new();
    let ids = IdGenerator::counter(handle_over(&store));
    let copy = ids.clone();
    assert_eq!(ids.backend(), BackendKind::Counter);
    assert_eq!(ids.next_id("orders").unwrap(), 1);
    assert_eq!(copy.next_id("orders").unwrap(), 2);
    assert!(copy.set_value("orders", 40));
    assert_eq!(ids.current_id("orders").unwrap(), 40);

    let clock = IdGenerator::clock(1).unwrap();
    assert_eq!(clock.backend(), BackendKind::Clock);
    assert!(IdGenerator::clock(1 << 10).is_err());

    let dynamic: Arc<dyn SequenceGenerator> = Arc::new(CounterSequence::new(handle_over(&store)));
    let wrapped = IdGenerator::from(dynamic);
    assert_eq!(wrapped.next_id("orders").unwrap(), 41);
    assert!(format!("{wrapped:?}").contains("Counter"));
}

#[test]
fn backend_kind_display() {
    assert_eq!(BackendKind::Counter.to_string(), "counter");
    assert_eq!(BackendKind::Clock.to_string(), "clock");
}
