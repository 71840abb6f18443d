//! A process-local counter store.
//!
//! [`MemoryStore`] implements the same primitives as a Redis server over
//! in-process maps, including key expiry and pub/sub, so the counter backend
//! and topic registry run unchanged without a network dependency. Clones of a
//! store share one keyspace.

use std::{
    collections::{HashMap, HashSet, VecDeque, hash_map::Entry as MapEntry},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::{KeyTtl, StoreClient, StoreError, StoreResult, Ttl};
use crate::{ClientFactory, Connector, Endpoint, MessageListener, Result, StopToken};

/// How often a blocked subscriber re-checks its stop token.
const SUBSCRIBE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
    channels: HashMap<String, Vec<(u64, Sender<Vec<u8>>)>>,
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.slots.remove(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Slot> {
        self.purge_if_expired(key);
        self.slots.get_mut(key)
    }

    /// Returns the slot at `key`, creating it with `init` when absent.
    fn slot_or_insert(&mut self, key: &str, init: fn() -> Value) -> &mut Slot {
        self.purge_if_expired(key);
        self.slots.entry(key.to_owned()).or_insert_with(|| Slot {
            value: init(),
            expires_at: None,
        })
    }

    fn apply_ttl(&mut self, key: &str, ttl: Ttl) -> bool {
        let Some(slot) = self.live(key) else {
            return false;
        };
        match ttl {
            Ttl::Unchanged => false,
            Ttl::Persistent => slot.expires_at.take().is_some(),
            Ttl::Seconds(secs) => {
                slot.expires_at = Some(Instant::now() + Duration::from_secs(secs));
                true
            }
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = self.slots.get(key).is_some_and(|slot| match &slot.value {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
        });
        if empty {
            self.slots.remove(key);
        }
    }

    fn add_to_int(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        let slot = self.slot_or_insert(key, || Value::Str("0".to_owned()));
        let Value::Str(current) = &mut slot.value else {
            return Err(StoreError::WrongType);
        };
        let parsed: i64 = current.parse().map_err(|_| StoreError::InvalidValue {
            key: key.to_owned(),
            value: current.clone(),
        })?;
        let next = parsed.checked_add(delta).ok_or_else(|| StoreError::InvalidValue {
            key: key.to_owned(),
            value: format!("{parsed} + {delta} overflows"),
        })?;
        *current = next.to_string();
        Ok(next)
    }
}

struct MemoryInner {
    keyspace: Mutex<Keyspace>,
    available: AtomicBool,
    next_client: AtomicU64,
}

/// A shared in-memory keyspace.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                keyspace: Mutex::new(Keyspace::default()),
                available: AtomicBool::new(true),
                next_client: AtomicU64::new(0),
            }),
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    /// While down, connecting and every client operation fail with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Opens a client on this keyspace.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] while the store is marked down.
    pub fn connect(&self) -> StoreResult<MemoryClient> {
        self.check()?;
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryClient {
            store: self.clone(),
            id,
        })
    }

    /// Number of clients opened over the store's lifetime.
    pub fn connections_opened(&self) -> u64 {
        self.inner.next_client.load(Ordering::Relaxed)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let mut keyspace = self.inner.keyspace.lock();
        let now = Instant::now();
        keyspace
            .slots
            .retain(|_, slot| slot.expires_at.is_none_or(|at| at > now));
        keyspace.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Keyspace) -> StoreResult<R>) -> StoreResult<R> {
        self.check()?;
        f(&mut self.inner.keyspace.lock())
    }
}

impl core::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("available", &self.is_available())
            .field("connections_opened", &self.connections_opened())
            .finish()
    }
}

/// A client connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryClient {
    store: MemoryStore,
    id: u64,
}

impl MemoryClient {
    /// Identifies the connection within its store.
    pub fn connection_id(&self) -> u64 {
        self.id
    }
}

impl StoreClient for MemoryClient {
    fn ping(&mut self) -> StoreResult<()> {
        self.store.check()
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        self.store.with(|ks| match ks.live(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn set(&mut self, key: &str, value: &str, ttl: Ttl) -> StoreResult<()> {
        self.store.with(|ks| {
            let expires_at = match ttl {
                Ttl::Seconds(secs) => Some(Instant::now() + Duration::from_secs(secs)),
                Ttl::Unchanged | Ttl::Persistent => None,
            };
            ks.slots.insert(
                key.to_owned(),
                Slot {
                    value: Value::Str(value.to_owned()),
                    expires_at,
                },
            );
            Ok(())
        })
    }

    fn get_set(&mut self, key: &str, value: &str) -> StoreResult<Option<String>> {
        self.store.with(|ks| {
            let previous = match ks.live(key) {
                None => None,
                Some(Slot {
                    value: Value::Str(s),
                    ..
                }) => Some(s.clone()),
                Some(_) => return Err(StoreError::WrongType),
            };
            ks.slots.insert(
                key.to_owned(),
                Slot {
                    value: Value::Str(value.to_owned()),
                    expires_at: None,
                },
            );
            Ok(previous)
        })
    }

    fn delete(&mut self, keys: &[&str]) -> StoreResult<u64> {
        self.store.with(|ks| {
            let mut removed = 0;
            for key in keys {
                ks.purge_if_expired(key);
                if ks.slots.remove(*key).is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn expire(&mut self, key: &str, ttl: Ttl) -> StoreResult<bool> {
        self.store.with(|ks| Ok(ks.apply_ttl(key, ttl)))
    }

    fn ttl(&mut self, key: &str) -> StoreResult<KeyTtl> {
        self.store.with(|ks| {
            Ok(match ks.live(key) {
                None => KeyTtl::Missing,
                Some(Slot {
                    expires_at: None, ..
                }) => KeyTtl::Persistent,
                Some(Slot {
                    expires_at: Some(at),
                    ..
                }) => KeyTtl::Seconds(at.saturating_duration_since(Instant::now()).as_secs()),
            })
        })
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        self.store.with(|ks| ks.add_to_int(key, delta))
    }

    fn decr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        let delta = delta.checked_neg().ok_or_else(|| StoreError::InvalidValue {
            key: key.to_owned(),
            value: delta.to_string(),
        })?;
        self.store.with(|ks| ks.add_to_int(key, delta))
    }

    fn hash_get(&mut self, map: &str, field: &str) -> StoreResult<Option<String>> {
        self.store.with(|ks| match ks.live(map) {
            None => Ok(None),
            Some(Slot {
                value: Value::Hash(h),
                ..
            }) => Ok(h.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn hash_set(&mut self, map: &str, field: &str, value: &str, ttl: Ttl) -> StoreResult<()> {
        self.store.with(|ks| {
            let Value::Hash(h) = &mut ks.slot_or_insert(map, || Value::Hash(HashMap::new())).value
            else {
                return Err(StoreError::WrongType);
            };
            h.insert(field.to_owned(), value.to_owned());
            ks.apply_ttl(map, ttl);
            Ok(())
        })
    }

    fn hash_incr_by(&mut self, map: &str, field: &str, delta: i64) -> StoreResult<i64> {
        self.store.with(|ks| {
            let Value::Hash(h) = &mut ks.slot_or_insert(map, || Value::Hash(HashMap::new())).value
            else {
                return Err(StoreError::WrongType);
            };
            let current = h.entry(field.to_owned()).or_insert_with(|| "0".to_owned());
            let parsed: i64 = current.parse().map_err(|_| StoreError::InvalidValue {
                key: format!("{map}.{field}"),
                value: current.clone(),
            })?;
            let next = parsed.checked_add(delta).ok_or_else(|| StoreError::InvalidValue {
                key: format!("{map}.{field}"),
                value: format!("{parsed} + {delta} overflows"),
            })?;
            *current = next.to_string();
            Ok(next)
        })
    }

    fn hash_delete(&mut self, map: &str, fields: &[&str]) -> StoreResult<u64> {
        self.store.with(|ks| {
            let removed = match ks.live(map) {
                None => 0,
                Some(Slot {
                    value: Value::Hash(h),
                    ..
                }) => fields.iter().filter(|f| h.remove(**f).is_some()).count() as u64,
                Some(_) => return Err(StoreError::WrongType),
            };
            ks.drop_if_empty(map);
            Ok(removed)
        })
    }

    fn hash_len(&mut self, map: &str) -> StoreResult<u64> {
        self.store.with(|ks| match ks.live(map) {
            None => Ok(0),
            Some(Slot {
                value: Value::Hash(h),
                ..
            }) => Ok(h.len() as u64),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn set_add(&mut self, name: &str, members: &[&str], ttl: Ttl) -> StoreResult<u64> {
        self.store.with(|ks| {
            let Value::Set(set) = &mut ks.slot_or_insert(name, || Value::Set(HashSet::new())).value
            else {
                return Err(StoreError::WrongType);
            };
            let added = members
                .iter()
                .filter(|m| set.insert((**m).to_owned()))
                .count() as u64;
            ks.drop_if_empty(name);
            ks.apply_ttl(name, ttl);
            Ok(added)
        })
    }

    fn set_remove(&mut self, name: &str, members: &[&str]) -> StoreResult<u64> {
        self.store.with(|ks| {
            let removed = match ks.live(name) {
                None => 0,
                Some(Slot {
                    value: Value::Set(set),
                    ..
                }) => members.iter().filter(|m| set.remove(**m)).count() as u64,
                Some(_) => return Err(StoreError::WrongType),
            };
            ks.drop_if_empty(name);
            Ok(removed)
        })
    }

    fn set_pop(&mut self, name: &str) -> StoreResult<Option<String>> {
        self.store.with(|ks| {
            let popped = match ks.live(name) {
                None => None,
                Some(Slot {
                    value: Value::Set(set),
                    ..
                }) => {
                    let member = set.iter().next().cloned();
                    if let Some(m) = &member {
                        set.remove(m);
                    }
                    member
                }
                Some(_) => return Err(StoreError::WrongType),
            };
            ks.drop_if_empty(name);
            Ok(popped)
        })
    }

    fn set_members(&mut self, name: &str) -> StoreResult<HashSet<String>> {
        self.store.with(|ks| match ks.live(name) {
            None => Ok(HashSet::new()),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.clone()),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn set_is_member(&mut self, name: &str, member: &str) -> StoreResult<bool> {
        self.store.with(|ks| match ks.live(name) {
            None => Ok(false),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.contains(member)),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn set_len(&mut self, name: &str) -> StoreResult<u64> {
        self.store.with(|ks| match ks.live(name) {
            None => Ok(0),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.len() as u64),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn list_push(&mut self, name: &str, values: &[&str], ttl: Ttl) -> StoreResult<u64> {
        self.store.with(|ks| {
            let Value::List(list) =
                &mut ks.slot_or_insert(name, || Value::List(VecDeque::new())).value
            else {
                return Err(StoreError::WrongType);
            };
            for value in values {
                list.push_front((*value).to_owned());
            }
            let len = list.len() as u64;
            ks.drop_if_empty(name);
            ks.apply_ttl(name, ttl);
            Ok(len)
        })
    }

    fn list_pop(&mut self, name: &str) -> StoreResult<Option<String>> {
        self.store.with(|ks| {
            let popped = match ks.live(name) {
                None => None,
                Some(Slot {
                    value: Value::List(list),
                    ..
                }) => list.pop_back(),
                Some(_) => return Err(StoreError::WrongType),
            };
            ks.drop_if_empty(name);
            Ok(popped)
        })
    }

    fn list_members(&mut self, name: &str) -> StoreResult<Vec<String>> {
        self.store.with(|ks| match ks.live(name) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::List(list),
                ..
            }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn list_len(&mut self, name: &str) -> StoreResult<u64> {
        self.store.with(|ks| match ks.live(name) {
            None => Ok(0),
            Some(Slot {
                value: Value::List(list),
                ..
            }) => Ok(list.len() as u64),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> StoreResult<u64> {
        self.store.with(|ks| {
            let MapEntry::Occupied(mut subscribers) = ks.channels.entry(topic.to_owned()) else {
                return Ok(0);
            };
            subscribers
                .get_mut()
                .retain(|(_, tx)| tx.send(payload.to_vec()).is_ok());
            let delivered = subscribers.get().len() as u64;
            if delivered == 0 {
                subscribers.remove();
            }
            Ok(delivered)
        })
    }

    fn subscribe(
        &mut self,
        topic: &str,
        listener: &dyn MessageListener,
        stop: &StopToken,
    ) -> StoreResult<()> {
        let (tx, rx) = mpsc::channel();
        let id = self.id;
        self.store.with(|ks| {
            ks.channels
                .entry(topic.to_owned())
                .or_default()
                .push((id, tx));
            Ok(())
        })?;

        let outcome = loop {
            if stop.is_cancelled() {
                break Ok(());
            }
            if !self.store.is_available() {
                break Err(StoreError::Unavailable);
            }
            match rx.recv_timeout(SUBSCRIBE_POLL) {
                Ok(payload) => listener.on_message(topic, &payload),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break Ok(()),
            }
        };

        let mut ks = self.store.inner.keyspace.lock();
        if let MapEntry::Occupied(mut subscribers) = ks.channels.entry(topic.to_owned()) {
            subscribers.get_mut().retain(|(sub, _)| *sub != id);
            if subscribers.get().is_empty() {
                subscribers.remove();
            }
        }
        outcome
    }
}

/// Opens [`MemoryClient`]s on one shared [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    store: MemoryStore,
}

impl MemoryFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl ClientFactory for MemoryFactory {
    type Client = MemoryClient;

    fn create(&self) -> StoreResult<MemoryClient> {
        self.store.connect()
    }

    fn validate(&self, client: &mut MemoryClient) -> bool {
        client.ping().is_ok()
    }
}

/// Routes every endpoint to the same [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Connector for MemoryConnector {
    type Factory = MemoryFactory;

    fn factory(&self, _endpoint: &Endpoint) -> Result<MemoryFactory> {
        Ok(MemoryFactory::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn client() -> MemoryClient {
        MemoryStore::new().connect().unwrap()
    }

    #[test]
    fn counters_start_at_zero() {
        let mut c = client();
        assert_eq!(c.incr_by("id:order", 1).unwrap(), 1);
        assert_eq!(c.incr_by("id:order", 5).unwrap(), 6);
        assert_eq!(c.decr_by("id:order", 2).unwrap(), 4);
        assert_eq!(c.get("id:order").unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn incr_on_text_is_invalid_value() {
        let mut c = client();
        c.set("k", "abc", Ttl::Persistent).unwrap();
        assert!(matches!(
            c.incr_by("k", 1),
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut c = client();
        c.list_push("l", &["a"], Ttl::Unchanged).unwrap();
        assert!(matches!(c.get("l"), Err(StoreError::WrongType)));
        assert!(matches!(c.set_len("l"), Err(StoreError::WrongType)));
    }

    #[test]
    fn expiry_and_ttl() {
        let mut c = client();
        c.set("k", "v", Ttl::Seconds(60)).unwrap();
        assert!(matches!(c.ttl("k").unwrap(), KeyTtl::Seconds(s) if s > 50));
        assert!(c.expire("k", Ttl::Persistent).unwrap());
        assert_eq!(c.ttl("k").unwrap(), KeyTtl::Persistent);
        assert!(!c.expire("k", Ttl::Unchanged).unwrap());
        assert_eq!(c.ttl("missing").unwrap(), KeyTtl::Missing);

        c.set("gone", "v", Ttl::Seconds(0)).unwrap();
        assert_eq!(c.get("gone").unwrap(), None);
    }

    #[test]
    fn get_set_returns_previous() {
        let mut c = client();
        assert_eq!(c.get_set("k", "1").unwrap(), None);
        assert_eq!(c.get_set("k", "2").unwrap().as_deref(), Some("1"));
        assert_eq!(c.delete(&["k", "nope"]).unwrap(), 1);
    }

    #[test]
    fn hashes() {
        let mut c = client();
        c.hash_set("h", "a", "1", Ttl::Unchanged).unwrap();
        assert_eq!(c.hash_incr_by("h", "a", 9).unwrap(), 10);
        assert_eq!(c.hash_incr_by("h", "b", 2).unwrap(), 2);
        assert_eq!(c.hash_len("h").unwrap(), 2);
        assert_eq!(c.hash_delete("h", &["a", "b", "c"]).unwrap(), 2);
        assert_eq!(c.hash_get("h", "a").unwrap(), None);
        assert_eq!(c.hash_len("h").unwrap(), 0);
    }

    #[test]
    fn sets() {
        let mut c = client();
        assert_eq!(c.set_add("s", &["a", "b", "a"], Ttl::Unchanged).unwrap(), 2);
        assert!(c.set_is_member("s", "a").unwrap());
        assert_eq!(c.set_remove("s", &["a"]).unwrap(), 1);
        assert_eq!(c.set_members("s").unwrap(), HashSet::from(["b".to_owned()]));
        assert_eq!(c.set_pop("s").unwrap().as_deref(), Some("b"));
        assert_eq!(c.set_len("s").unwrap(), 0);
        assert_eq!(c.set_pop("s").unwrap(), None);
    }

    #[test]
    fn lists_are_fifo_queues() {
        let mut c = client();
        assert_eq!(c.list_push("q", &["1", "2"], Ttl::Unchanged).unwrap(), 2);
        assert_eq!(c.list_push("q", &["3"], Ttl::Unchanged).unwrap(), 3);
        assert_eq!(c.list_members("q").unwrap(), vec!["3", "2", "1"]);
        assert_eq!(c.list_pop("q").unwrap().as_deref(), Some("1"));
        assert_eq!(c.list_len("q").unwrap(), 2);
    }

    #[test]
    fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        let mut c = store.connect().unwrap();
        store.set_available(false);
        assert!(matches!(c.ping(), Err(StoreError::Unavailable)));
        assert!(matches!(c.incr_by("k", 1), Err(StoreError::Unavailable)));
        assert!(matches!(store.connect(), Err(StoreError::Unavailable)));
        store.set_available(true);
        assert!(c.ping().is_ok());
    }

    #[test]
    fn publish_reaches_subscriber_until_stopped() {
        let store = MemoryStore::new();
        let mut subscriber = store.connect().unwrap();
        let mut publisher = store.connect().unwrap();
        let stop = StopToken::new();
        let received = AtomicUsize::new(0);
        let listener = |topic: &str, payload: &[u8]| {
            assert_eq!(topic, "events");
            assert_eq!(payload, b"ping");
            received.fetch_add(1, Ordering::SeqCst);
        };

        std::thread::scope(|s| {
            let handle = s.spawn(|| subscriber.subscribe("events", &listener, &stop));
            while publisher.publish("events", b"ping").unwrap() == 0 {
                std::thread::yield_now();
            }
            while received.load(Ordering::SeqCst) == 0 {
                std::thread::yield_now();
            }
            stop.cancel();
            handle.join().unwrap().unwrap();
        });

        assert_eq!(publisher.publish("events", b"ping").unwrap(), 0);
    }
}
