use super::Endpoint;
use crate::{ClientFactory, Result};

/// Builds the [`ClientFactory`] for an endpoint. The registry calls this once
/// per distinct pool.
pub trait Connector: Send + Sync + 'static {
    type Factory: ClientFactory;

    fn factory(&self, endpoint: &Endpoint) -> Result<Self::Factory>;
}
