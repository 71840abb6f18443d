use std::sync::Arc;

use super::{BackendKind, CounterSequence, SequenceGenerator};
use crate::{ClientFactory, ClockSequence, Connector, PoolHandle, Result, StoreClient};

/// A cloneable handle over any [`SequenceGenerator`] backend.
///
/// # Example
/// ```
/// use seqforge::{IdGenerator, SequenceGenerator};
///
/// let ids = IdGenerator::clock(7).unwrap();
/// let a = ids.next_id("orders").unwrap();
/// let b = ids.next_id("orders").unwrap();
/// assert!(b > a);
/// assert_eq!(ids.current_id("orders").unwrap(), b);
/// ```
#[derive(Clone)]
pub struct IdGenerator {
    inner: Arc<dyn SequenceGenerator>,
}

impl IdGenerator {
    pub fn new(backend: impl SequenceGenerator + 'static) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    /// Counter-backed generator routed through `handle`.
    pub fn counter<C>(handle: PoolHandle<C>) -> Self
    where
        C: Connector,
        <C::Factory as ClientFactory>::Client: StoreClient,
    {
        Self::new(CounterSequence::new(handle))
    }

    /// Clock-backed generator on the system clock.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `node_id`
    /// does not fit the node field.
    pub fn clock(node_id: u64) -> Result<Self> {
        ClockSequence::new(node_id).map(Self::new)
    }
}

impl From<Arc<dyn SequenceGenerator>> for IdGenerator {
    fn from(inner: Arc<dyn SequenceGenerator>) -> Self {
        Self { inner }
    }
}

impl SequenceGenerator for IdGenerator {
    fn next_id(&self, namespace: &str) -> Result<i64> {
        self.inner.next_id(namespace)
    }

    fn current_id(&self, namespace: &str) -> Result<i64> {
        self.inner.current_id(namespace)
    }

    fn set_value(&self, namespace: &str, value: i64) -> bool {
        self.inner.set_value(namespace, value)
    }

    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }
}

impl core::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("backend", &self.inner.backend())
            .finish_non_exhaustive()
    }
}
