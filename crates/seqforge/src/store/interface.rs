use std::collections::HashSet;

use super::StoreError;
use crate::{MessageListener, StopToken};

pub type StoreResult<T> = Result<T, StoreError>;

/// Expiry to apply alongside a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// Leave any existing expiry as it is.
    #[default]
    Unchanged,
    /// Remove any expiry; the key lives until deleted.
    Persistent,
    /// Expire after this many seconds.
    Seconds(u64),
}

impl Ttl {
    /// Interprets the conventional signed encoding: `0` leaves the expiry
    /// alone, a negative value makes the key persistent, anything else is a
    /// number of seconds.
    pub const fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Self::Unchanged,
            s if s < 0 => Self::Persistent,
            s => Self::Seconds(s as u64),
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Seconds(u64),
}

/// A single connection to a counter store.
///
/// A client is not shared between threads: the pool hands it to one borrower
/// at a time, which is why every method takes `&mut self`. Lists behave as
/// queues (push at the head, pop from the tail).
pub trait StoreClient: Send {
    /// Liveness probe used by pool validation.
    fn ping(&mut self) -> StoreResult<()>;

    fn get(&mut self, key: &str) -> StoreResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str, ttl: Ttl) -> StoreResult<()>;
    /// Stores `value` and returns the previous value.
    fn get_set(&mut self, key: &str, value: &str) -> StoreResult<Option<String>>;
    /// Deletes keys, returning how many existed.
    fn delete(&mut self, keys: &[&str]) -> StoreResult<u64>;
    /// Applies `ttl` to an existing key. Returns `true` if the expiry changed.
    fn expire(&mut self, key: &str, ttl: Ttl) -> StoreResult<bool>;
    fn ttl(&mut self, key: &str) -> StoreResult<KeyTtl>;

    /// Atomically adds `delta` to the integer at `key` (missing keys count as
    /// zero) and returns the new value.
    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64>;
    fn decr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64>;

    fn hash_get(&mut self, map: &str, field: &str) -> StoreResult<Option<String>>;
    fn hash_set(&mut self, map: &str, field: &str, value: &str, ttl: Ttl) -> StoreResult<()>;
    fn hash_incr_by(&mut self, map: &str, field: &str, delta: i64) -> StoreResult<i64>;
    fn hash_delete(&mut self, map: &str, fields: &[&str]) -> StoreResult<u64>;
    fn hash_len(&mut self, map: &str) -> StoreResult<u64>;

    fn set_add(&mut self, name: &str, members: &[&str], ttl: Ttl) -> StoreResult<u64>;
    fn set_remove(&mut self, name: &str, members: &[&str]) -> StoreResult<u64>;
    fn set_pop(&mut self, name: &str) -> StoreResult<Option<String>>;
    fn set_members(&mut self, name: &str) -> StoreResult<HashSet<String>>;
    fn set_is_member(&mut self, name: &str, member: &str) -> StoreResult<bool>;
    fn set_len(&mut self, name: &str) -> StoreResult<u64>;

    fn list_push(&mut self, name: &str, values: &[&str], ttl: Ttl) -> StoreResult<u64>;
    fn list_pop(&mut self, name: &str) -> StoreResult<Option<String>>;
    fn list_members(&mut self, name: &str) -> StoreResult<Vec<String>>;
    fn list_len(&mut self, name: &str) -> StoreResult<u64>;

    /// Publishes `payload` on `topic`, returning the number of receivers.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> StoreResult<u64>;

    /// Delivers every message on `topic` to `listener` until `stop` is
    /// cancelled. Blocks the calling thread for the whole subscription.
    fn subscribe(
        &mut self,
        topic: &str,
        listener: &dyn MessageListener,
        stop: &StopToken,
    ) -> StoreResult<()>;
}
