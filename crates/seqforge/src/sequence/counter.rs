#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{BackendKind, SequenceGenerator};
use crate::{
    ClientFactory, Connector, Error, Namespace, PoolHandle, Result, StoreClient, StoreError, Ttl,
};

pub const DEFAULT_KEY_PREFIX: &str = "id:";

/// Sequences kept as integer counters in a shared store.
///
/// Every operation borrows one pooled client, issues a single command and
/// returns the client, so a batch of calls never pins a connection. Atomicity
/// comes from the store's increment command, which makes the sequence safe to
/// share across threads and processes.
///
/// ## Features
/// - `next_id` is `INCRBY key 1`; a fresh namespace yields `1`.
/// - `current_id` is a plain read; a missing key reads as `0`.
/// - `set_value` is an unconditional write without expiry.
///
/// ## Recommended When
/// - Several processes must draw from one dense sequence.
///
/// ## See Also
/// - [`ClockSequence`](crate::ClockSequence)
pub struct CounterSequence<C: Connector> {
    handle: PoolHandle<C>,
    key_prefix: String,
}

impl<C> CounterSequence<C>
where
    C: Connector,
    <C::Factory as ClientFactory>::Client: StoreClient,
{
    pub fn new(handle: PoolHandle<C>) -> Self {
        Self::with_key_prefix(handle, DEFAULT_KEY_PREFIX)
    }

    pub fn with_key_prefix(handle: PoolHandle<C>, key_prefix: impl Into<String>) -> Self {
        Self {
            handle,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn handle(&self) -> &PoolHandle<C> {
        &self.handle
    }

    fn key(&self, namespace: &str) -> Result<String> {
        let namespace = Namespace::parse(namespace)?;
        Ok(format!("{}{namespace}", self.key_prefix))
    }

    fn try_set_value(&self, namespace: &str, value: i64) -> Result<()> {
        let key = self.key(namespace)?;
        self.handle
            .borrow()?
            .call(|client| client.set(&key, &value.to_string(), Ttl::Persistent))
    }
}

impl<C> SequenceGenerator for CounterSequence<C>
where
    C: Connector,
    <C::Factory as ClientFactory>::Client: StoreClient,
{
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn next_id(&self, namespace: &str) -> Result<i64> {
        let key = self.key(namespace)?;
        self.handle.borrow()?.call(|client| client.incr_by(&key, 1))
    }

    fn current_id(&self, namespace: &str) -> Result<i64> {
        let key = self.key(namespace)?;
        let stored = self.handle.borrow()?.call(|client| client.get(&key))?;
        match stored {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| Error::Store(StoreError::InvalidValue { key, value })),
        }
    }

    fn set_value(&self, namespace: &str, value: i64) -> bool {
        match self.try_set_value(namespace, value) {
            Ok(()) => true,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(namespace, value, error = %_e, "set_value failed");
                false
            }
        }
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Counter
    }
}

impl<C: Connector> core::fmt::Debug for CounterSequence<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CounterSequence")
            .field("handle", &self.handle)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
