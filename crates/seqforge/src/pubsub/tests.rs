use core::time::Duration;
use std::{
    sync::Arc,
    thread::{self, scope},
    time::Instant,
};

use parking_lot::Mutex;

use super::*;
use crate::{
    ClientPoolRegistry, Endpoint, Error, MemoryConnector, MemoryStore, PoolConfig, PoolHandle,
    RegistryConfig,
};

#[derive(Default)]
struct Collector {
    received: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MessageListener for Collector {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.received.lock().push((topic.to_owned(), payload.to_vec()));
    }
}

fn topics_over(store: &MemoryStore) -> Arc<TopicRegistry<MemoryConnector>> {
    let registry = ClientPoolRegistry::with_config(
        MemoryConnector::new(store.clone()),
        RegistryConfig::default().with_sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    TopicRegistry::new(PoolHandle::new(registry, Endpoint::default(), PoolConfig::default()))
}

/// Publishes until a subscriber receives it, or gives up after five seconds.
fn publish_when_subscribed(topics: &TopicRegistry<MemoryConnector>, topic: &str, payload: &[u8]) -> u64 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let delivered = topics.publish(topic, payload).unwrap();
        if delivered > 0 || Instant::now() >= deadline {
            return delivered;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn delivers_until_unsubscribed() {
    let store = MemoryStore::new();
    let topics = topics_over(&store);
    let collector = Arc::new(Collector::default());
    let listener: Arc<dyn MessageListener> = collector.clone();

    scope(|s| {
        let runner = {
            let topics = Arc::clone(&topics);
            let listener = Arc::clone(&listener);
            s.spawn(move || topics.subscribe_blocking("events", listener))
        };

        assert_eq!(publish_when_subscribed(&topics, "events", b"hello"), 1);
        assert_eq!(topics.listener_count("events"), 1);
        assert_eq!(topics.topics(), vec!["events".to_owned()]);

        assert!(topics.unsubscribe("events", &listener));
        assert!(runner.join().unwrap().unwrap());
    });

    let received = collector.received.lock();
    assert!(received.iter().all(|(topic, _)| topic == "events"));
    assert_eq!(received.first().map(|(_, p)| p.as_slice()), Some(&b"hello"[..]));
    assert_eq!(topics.listener_count("events"), 0);
    assert!(topics.topics().is_empty());
}

#[test]
fn duplicate_subscription_is_a_no_op() {
    let topics = topics_over(&MemoryStore::new());
    let listener: Arc<dyn MessageListener> = Arc::new(Collector::default());

    let first = topics.subscribe("events", Arc::clone(&listener)).unwrap();
    assert!(first.is_some());
    assert!(topics.subscribe("events", Arc::clone(&listener)).unwrap().is_none());
    assert!(!topics.subscribe_blocking("events", Arc::clone(&listener)).unwrap());

    // The same listener may follow a second topic.
    let other = topics.subscribe("audit", Arc::clone(&listener)).unwrap();
    assert!(other.is_some());
    assert_eq!(topics.listener_count("events"), 1);
    assert_eq!(topics.listener_count("audit"), 1);
}

#[test]
fn dropping_an_unrun_subscription_releases_it() {
    let topics = topics_over(&MemoryStore::new());
    let listener: Arc<dyn MessageListener> = Arc::new(Collector::default());

    let subscription = topics.subscribe("events", Arc::clone(&listener)).unwrap();
    drop(subscription);
    assert_eq!(topics.listener_count("events"), 0);
    assert!(topics.subscribe("events", listener).unwrap().is_some());
}

#[test]
fn unsubscribe_unknown_listener_returns_false() {
    let topics = topics_over(&MemoryStore::new());
    let listener: Arc<dyn MessageListener> = Arc::new(Collector::default());
    assert!(!topics.unsubscribe("events", &listener));

    let _held = topics.subscribe("events", Arc::clone(&listener)).unwrap();
    let stranger: Arc<dyn MessageListener> = Arc::new(Collector::default());
    assert!(!topics.unsubscribe("events", &stranger));
    assert!(topics.unsubscribe("events", &listener));
    assert!(!topics.unsubscribe("events", &listener));
}

#[test]
fn canceller_ends_a_running_subscription() {
    let store = MemoryStore::new();
    let topics = topics_over(&store);
    let listener: Arc<dyn MessageListener> = Arc::new(|_: &str, _: &[u8]| {});
    let subscription = topics.subscribe("jobs", listener).unwrap().unwrap();
    let canceller = subscription.canceller();

    scope(|s| {
        let runner = s.spawn(move || subscription.run());
        publish_when_subscribed(&topics, "jobs", b"x");
        canceller.cancel();
        runner.join().unwrap().unwrap();
    });
    assert_eq!(topics.listener_count("jobs"), 0);
}

#[test]
fn unsubscribe_all_cancels_everything() {
    let topics = topics_over(&MemoryStore::new());
    let a: Arc<dyn MessageListener> = Arc::new(Collector::default());
    let b: Arc<dyn MessageListener> = Arc::new(Collector::default());
    let sa = topics.subscribe("one", a).unwrap().unwrap();
    let sb = topics.subscribe("two", b).unwrap().unwrap();

    assert_eq!(topics.unsubscribe_all(), 2);
    assert!(topics.topics().is_empty());
    // Already cancelled: running returns at once.
    sa.run().unwrap();
    sb.run().unwrap();
}

#[test]
fn store_outage_ends_subscription_with_error() {
    let store = MemoryStore::new();
    let topics = topics_over(&store);
    let listener: Arc<dyn MessageListener> = Arc::new(Collector::default());

    scope(|s| {
        let runner = {
            let topics = Arc::clone(&topics);
            s.spawn(move || topics.subscribe_blocking("events", listener))
        };
        publish_when_subscribed(&topics, "events", b"ping");
        store.set_available(false);
        let err = runner.join().unwrap().unwrap_err();
        assert!(err.is_backend_unavailable());
    });
    assert_eq!(topics.listener_count("events"), 0);
}

#[test]
fn malformed_topics_are_rejected_before_io() {
    let store = MemoryStore::new();
    let topics = topics_over(&store);
    let listener: Arc<dyn MessageListener> = Arc::new(Collector::default());

    assert!(matches!(
        topics.subscribe("", Arc::clone(&listener)),
        Err(Error::InvalidNamespace { .. })
    ));
    assert!(matches!(
        topics.publish("two words", b"x"),
        Err(Error::InvalidNamespace { .. })
    ));
    assert_eq!(store.connections_opened(), 0);
}

#[test]
fn publish_without_subscribers_reaches_nobody() {
    let topics = topics_over(&MemoryStore::new());
    assert_eq!(topics.publish("quiet", b"anyone?").unwrap(), 0);
}
