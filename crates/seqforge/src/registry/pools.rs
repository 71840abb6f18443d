use core::time::Duration;
use std::{collections::HashMap, sync::Arc, thread, time::Instant};

use parking_lot::Mutex;

use super::{ConnectionDescriptor, Connector, Endpoint};
use crate::{ClientPool, Error, PoolConfig, PooledClient, Result, StopToken};

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Lifetime policy for the pools a [`ClientPoolRegistry`] owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// A pool with no borrows for this long is shut down and forgotten.
    pub idle_ttl: Duration,
    /// Period of the background sweep that applies `idle_ttl`.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RegistryConfig {
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(Error::config("sweep_interval must be non-zero"));
        }
        Ok(())
    }
}

struct PoolEntry<C: Connector> {
    pool: Arc<ClientPool<C::Factory>>,
    last_used: Instant,
}

/// Owns one [`ClientPool`] per [`ConnectionDescriptor`].
///
/// Pools are created lazily on first request, exactly once per descriptor:
/// the lookup and the creation happen under one lock, so concurrent first
/// callers always receive the same pool.
///
/// ## Features
/// - Explicit lifecycle: construct with [`ClientPoolRegistry::new`], stop with
///   [`ClientPoolRegistry::shutdown`] or by dropping the last handle.
/// - Pools unused for [`RegistryConfig::idle_ttl`] are shut down before they
///   are removed, so eviction never orphans a live connection.
///
/// ## See Also
/// - [`PoolHandle`](crate::PoolHandle)
pub struct ClientPoolRegistry<C: Connector> {
    connector: C,
    config: RegistryConfig,
    pools: Mutex<HashMap<ConnectionDescriptor, PoolEntry<C>>>,
    stop: StopToken,
}

impl<C: Connector> ClientPoolRegistry<C> {
    /// Creates a registry with [`RegistryConfig::default`] and starts its
    /// sweeper thread.
    pub fn new(connector: C) -> Result<Arc<Self>> {
        Self::with_config(connector, RegistryConfig::default())
    }

    pub fn with_config(connector: C, config: RegistryConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let registry = Arc::new(Self {
            connector,
            config,
            pools: Mutex::new(HashMap::new()),
            stop: StopToken::new(),
        });
        registry.spawn_sweeper()?;
        Ok(registry)
    }

    fn spawn_sweeper(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let stop = self.stop.clone();
        let interval = self.config.sweep_interval;

        thread::Builder::new()
            .name("seqforge-registry-sweep".to_owned())
            .spawn(move || {
                while !stop.wait_timeout(interval) {
                    let Some(registry) = weak.upgrade() else {
                        break;
                    };
                    registry.evict_idle();
                }
            })
            .map(drop)
            .map_err(|e| Error::unavailable(format!("cannot start registry sweeper: {e}")))
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the pool for `endpoint` and `config`, creating it on first
    /// use.
    ///
    /// # Errors
    /// - [`Error::PoolClosed`] after [`ClientPoolRegistry::shutdown`].
    /// - [`Error::InvalidConfig`] if `config` fails validation.
    /// - Whatever the connector reports when building the client factory.
    pub fn pool(&self, endpoint: &Endpoint, config: &PoolConfig) -> Result<Arc<ClientPool<C::Factory>>> {
        if self.stop.is_cancelled() {
            return Err(Error::PoolClosed);
        }
        let descriptor = ConnectionDescriptor::new(endpoint, config);
        let mut pools = self.pools.lock();
        if let Some(entry) = pools.get_mut(&descriptor) {
            entry.last_used = Instant::now();
            return Ok(Arc::clone(&entry.pool));
        }

        let factory = self.connector.factory(endpoint)?;
        let name = format!("{}:{}", endpoint.host, endpoint.port);
        let pool = ClientPool::with_name(factory, config.clone(), name)?;

        #[cfg(feature = "tracing")]
        tracing::info!(descriptor = %descriptor, pools = pools.len() + 1, "registered client pool");

        pools.insert(
            descriptor,
            PoolEntry {
                pool: Arc::clone(&pool),
                last_used: Instant::now(),
            },
        );
        Ok(pool)
    }

    /// Borrows a client from the pool for `endpoint` and `config`.
    pub fn borrow(&self, endpoint: &Endpoint, config: &PoolConfig) -> Result<PooledClient<C::Factory>> {
        self.pool(endpoint, config)?.borrow()
    }

    /// Shuts down and removes every pool idle for at least `idle_ttl`.
    /// Pools with clients on loan are kept. Returns the number removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.idle_ttl;
        let mut pools = self.pools.lock();
        let before = pools.len();
        pools.retain(|_descriptor, entry| {
            let expired = now.saturating_duration_since(entry.last_used) >= ttl
                && entry.pool.status().active == 0;
            if expired {
                entry.pool.shutdown();
                #[cfg(feature = "tracing")]
                tracing::debug!(descriptor = %_descriptor, "evicted idle client pool");
            }
            !expired
        });
        before - pools.len()
    }

    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.pools.lock().keys().cloned().collect()
    }

    /// Stops the sweeper and shuts down every pool. Later requests fail with
    /// [`Error::PoolClosed`].
    pub fn shutdown(&self) {
        if self.stop.is_cancelled() {
            return;
        }
        self.stop.cancel();
        let drained: Vec<_> = self.pools.lock().drain().collect();
        for (_, entry) in &drained {
            entry.pool.shutdown();
        }

        #[cfg(feature = "tracing")]
        tracing::info!(pools = drained.len(), "client pool registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl<C: Connector> Drop for ClientPoolRegistry<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Connector> core::fmt::Debug for ClientPoolRegistry<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientPoolRegistry")
            .field("config", &self.config)
            .field("pools", &self.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
