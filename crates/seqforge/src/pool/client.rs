use std::{
    collections::HashSet,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{
    ClientFactory, EvictionReport, PoolConfig, maintainer,
    object::{ClientId, Lease, ObjectPool},
};
use crate::{Error, Result, store::StoreResult};

#[derive(Default)]
struct ActiveSet {
    borrowed: HashSet<ClientId>,
    /// Borrowed when the pool shut down; destroyed on return.
    doomed: HashSet<ClientId>,
}

/// Point-in-time counts of a [`ClientPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub active: usize,
    pub total: usize,
    pub closed: bool,
}

/// A bounded pool of store clients that tracks which clients are on loan.
///
/// Borrowing hands out a [`PooledClient`] guard; dropping the guard returns
/// the client, so a client is released on every path out of the borrowing
/// scope. [`ClientPool::shutdown`] destroys idle clients at once and every
/// loaned client when it comes back.
///
/// A background thread runs [`ClientPool::run_maintenance`] every
/// `eviction_interval_ms`.
pub struct ClientPool<F: ClientFactory> {
    name: String,
    inner: Arc<ObjectPool<F>>,
    active: Mutex<ActiveSet>,
}

impl<F: ClientFactory> ClientPool<F> {
    /// Creates a pool and starts its maintainer thread.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(factory: F, config: PoolConfig) -> Result<Arc<Self>> {
        Self::with_name(factory, config, "pool")
    }

    /// Like [`ClientPool::new`], naming the pool in logs and thread names.
    pub fn with_name(factory: F, config: PoolConfig, name: impl Into<String>) -> Result<Arc<Self>> {
        config.validate()?;
        let name = name.into();
        let inner = Arc::new(ObjectPool::new(factory, config));
        maintainer::spawn(&inner, &name)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %name,
            max_active = inner.config().max_active,
            max_idle = inner.config().effective_max_idle(),
            min_idle = inner.config().effective_min_idle(),
            "client pool created"
        );

        Ok(Arc::new(Self {
            name,
            inner,
            active: Mutex::new(ActiveSet::default()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        self.inner.config()
    }

    /// Borrows a client, waiting up to `max_wait_ms` when the pool is at its
    /// bound.
    ///
    /// # Errors
    /// - [`Error::PoolExhausted`] if no client frees up in time.
    /// - [`Error::BackendUnavailable`] if a new client cannot be opened or
    ///   fails its creation probe.
    /// - [`Error::PoolClosed`] after [`ClientPool::shutdown`].
    pub fn borrow(self: &Arc<Self>) -> Result<PooledClient<F>> {
        let lease = self.inner.borrow()?;
        self.active.lock().borrowed.insert(lease.id);
        Ok(PooledClient {
            pool: Arc::clone(self),
            lease: Some(lease),
            healthy: true,
        })
    }

    fn give_back(&self, lease: Lease<F::Client>, healthy: bool) {
        let doomed = {
            let mut active = self.active.lock();
            active.borrowed.remove(&lease.id);
            active.doomed.remove(&lease.id)
        };
        self.inner.give_back(lease, healthy && !doomed);
    }

    /// Runs one eviction and backfill pass immediately.
    pub fn run_maintenance(&self) -> EvictionReport {
        self.inner.evict()
    }

    /// Closes the pool. Idle clients are destroyed now; clients on loan are
    /// invalidated and destroyed when returned. Later borrows fail with
    /// [`Error::PoolClosed`].
    pub fn shutdown(&self) {
        if self.inner.is_closed() {
            return;
        }
        let _in_flight = {
            let mut active = self.active.lock();
            let ActiveSet { borrowed, doomed } = &mut *active;
            doomed.extend(borrowed.drain());
            doomed.len()
        };
        let _destroyed = self.inner.close();

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %self.name,
            destroyed = _destroyed,
            in_flight = _in_flight,
            "client pool shut down"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        let (idle, total) = self.inner.counts();
        let active = self.active.lock();
        PoolStatus {
            idle,
            active: active.borrowed.len() + active.doomed.len(),
            total,
            closed: self.inner.is_closed(),
        }
    }
}

impl<F: ClientFactory> Drop for ClientPool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: ClientFactory> core::fmt::Debug for ClientPool<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientPool")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// A client on loan from a [`ClientPool`]. Returned to the pool on drop.
pub struct PooledClient<F: ClientFactory> {
    pool: Arc<ClientPool<F>>,
    lease: Option<Lease<F::Client>>,
    healthy: bool,
}

impl<F: ClientFactory> PooledClient<F> {
    /// Marks the client broken: it is destroyed instead of re-queued.
    pub fn discard(&mut self) {
        self.healthy = false;
    }

    pub fn is_discarded(&self) -> bool {
        !self.healthy
    }

    /// Pool-unique id of the underlying client.
    pub fn id(&self) -> u64 {
        self.lease.as_ref().map_or(0, |lease| lease.id)
    }

    pub fn pool(&self) -> &Arc<ClientPool<F>> {
        &self.pool
    }

    /// Runs one store operation. A connection-level failure discards the
    /// client and surfaces as [`Error::BackendUnavailable`]; other store
    /// failures surface as [`Error::Store`].
    pub fn call<R>(&mut self, op: impl FnOnce(&mut F::Client) -> StoreResult<R>) -> Result<R> {
        match op(&mut **self) {
            Ok(value) => Ok(value),
            Err(e) if e.is_connection_error() => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    pool = %self.pool.name,
                    client = self.id(),
                    error = %e,
                    "discarding client after store failure"
                );
                self.discard();
                Err(Error::unavailable(e.to_string()))
            }
            Err(e) => Err(Error::Store(e)),
        }
    }
}

impl<F: ClientFactory> core::fmt::Debug for PooledClient<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PooledClient")
            .field("pool", &self.pool.name)
            .field("id", &self.id())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

impl<F: ClientFactory> Deref for PooledClient<F> {
    type Target = F::Client;

    fn deref(&self) -> &F::Client {
        match &self.lease {
            Some(lease) => &lease.client,
            None => unreachable!("pooled client used after return"),
        }
    }
}

impl<F: ClientFactory> DerefMut for PooledClient<F> {
    fn deref_mut(&mut self) -> &mut F::Client {
        match &mut self.lease {
            Some(lease) => &mut lease.client,
            None => unreachable!("pooled client used after return"),
        }
    }
}

impl<F: ClientFactory> Drop for PooledClient<F> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.pool.give_back(lease, self.healthy);
        }
    }
}
