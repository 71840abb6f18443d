use crate::store::StoreResult;

/// Creates, probes, and disposes of the clients a pool manages.
///
/// The pool never inspects clients itself; every decision about health goes
/// through [`ClientFactory::validate`].
pub trait ClientFactory: Send + Sync + 'static {
    type Client: Send + 'static;

    /// Opens a new client.
    fn create(&self) -> StoreResult<Self::Client>;

    /// Liveness probe. `false` means the client must be destroyed.
    fn validate(&self, client: &mut Self::Client) -> bool;

    /// Releases a client's resources. Dropping it is enough for most
    /// clients.
    fn destroy(&self, client: Self::Client) {
        drop(client);
    }
}
