/// Failures reported by a [`StoreClient`](crate::StoreClient).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The store cannot be reached at all.
    #[error("store is unavailable")]
    Unavailable,

    /// Transport failure on an established connection.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The store answered with something the client did not expect.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// The key holds a different kind of value than the operation expects.
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// A stored value could not be interpreted.
    #[error("value at `{key}` is not an integer: {value:?}")]
    InvalidValue { key: String, value: String },

    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Returns `true` when the connection that produced the error should not
    /// be reused.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Unavailable | Self::Io(_) | Self::Protocol { .. } => true,
            Self::WrongType | Self::InvalidValue { .. } => false,
            #[cfg(feature = "redis")]
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
        }
    }
}
