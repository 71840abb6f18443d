use std::sync::Arc;

use super::{ClientPoolRegistry, Connector, Endpoint};
use crate::{ClientPool, PoolConfig, PooledClient, Result};

/// A route to one pool: a registry plus the endpoint and config that select
/// the pool inside it.
///
/// Backends hold a handle and borrow per logical operation, so a pool evicted
/// by the registry is transparently recreated on the next call.
pub struct PoolHandle<C: Connector> {
    registry: Arc<ClientPoolRegistry<C>>,
    endpoint: Endpoint,
    config: PoolConfig,
}

impl<C: Connector> PoolHandle<C> {
    pub fn new(registry: Arc<ClientPoolRegistry<C>>, endpoint: Endpoint, config: PoolConfig) -> Self {
        Self {
            registry,
            endpoint,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ClientPoolRegistry<C>> {
        &self.registry
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn pool(&self) -> Result<Arc<ClientPool<C::Factory>>> {
        self.registry.pool(&self.endpoint, &self.config)
    }

    pub fn borrow(&self) -> Result<PooledClient<C::Factory>> {
        self.registry.borrow(&self.endpoint, &self.config)
    }
}

impl<C: Connector> Clone for PoolHandle<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            endpoint: self.endpoint.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: Connector> core::fmt::Debug for PoolHandle<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
