//! Error types shared by every `seqforge` backend.
//!
//! The [`Error`] enum is the single failure taxonomy surfaced through the
//! sequence contract. Store-level failures are reported by the collaborator as
//! [`StoreError`] and folded into [`Error::Store`] so callers can still inspect
//! the underlying cause.
//!
//! ## Error Cases
//! - `BackendUnavailable`: a pooled client could not be created, validated, or
//!   reached.
//! - `PoolExhausted`: no client became available within the pool's wait bound.
//! - `PoolClosed`: the pool (or its registry) was shut down.
//! - `ClockRegression`: the wall clock moved backwards past the tolerance.
//! - `InvalidNamespace` / `InvalidConfig`: the caller supplied bad input.

use crate::store::StoreError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All failures `seqforge` can report.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A pooled client could not be created or reached.
    #[error("backend unavailable: {context}")]
    BackendUnavailable { context: String },

    /// The pool bound was reached and no client was returned in time.
    #[error("client pool exhausted after waiting {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// The pool was shut down while the request was in flight.
    #[error("client pool is closed")]
    PoolClosed,

    /// The clock reads earlier than the last issued timestamp.
    #[error("clock moved backwards: last issued at {last_ms} ms, clock reads {now_ms} ms")]
    ClockRegression { last_ms: u64, now_ms: u64 },

    /// The clock reads earlier than the layout's epoch.
    #[error("clock reads {now_ms} ms which precedes the layout epoch {epoch_ms} ms")]
    ClockBeforeEpoch { now_ms: u64, epoch_ms: u64 },

    /// The layout's timestamp field can no longer represent the clock.
    #[error("timestamp field of layout `{layout}` is exhausted")]
    TimestampOverflow { layout: &'static str },

    /// The namespace was rejected before any I/O.
    #[error("invalid namespace: {reason}")]
    InvalidNamespace { reason: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The counter store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns `true` when retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendUnavailable { .. } | Self::PoolExhausted { .. } => true,
            Self::Store(e) => e.is_connection_error(),
            _ => false,
        }
    }

    /// Returns `true` for failures caused by the store or its connections.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Store(_))
    }

    pub(crate) fn unavailable(context: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            context: context.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
