use core::fmt;

use crate::Result;

/// Which kind of backend serves a [`SequenceGenerator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    /// Shared counters in an external store.
    Counter,
    /// Process-local timestamp/node/sequence ids.
    Clock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Counter => "counter",
            Self::Clock => "clock",
        })
    }
}

/// Namespace-scoped id issuing, implemented by every backend.
///
/// Namespaces are validated with [`Namespace::parse`](crate::Namespace::parse)
/// before any I/O.
///
/// ## Ordering
/// Consecutive [`SequenceGenerator::next_id`] results for one namespace are
/// strictly increasing unless [`SequenceGenerator::set_value`] intervenes.
/// Gaps are allowed. `set_value` is not ordered against concurrent `next_id`
/// calls; callers that need that must serialize themselves.
pub trait SequenceGenerator: Send + Sync {
    /// Advances `namespace` and returns its new value.
    ///
    /// # Errors
    /// - [`Error::InvalidNamespace`](crate::Error::InvalidNamespace)
    /// - [`Error::BackendUnavailable`](crate::Error::BackendUnavailable) or
    ///   [`Error::PoolExhausted`](crate::Error::PoolExhausted) from the counter
    ///   backend
    /// - [`Error::ClockRegression`](crate::Error::ClockRegression) from the
    ///   clock backend
    fn next_id(&self, namespace: &str) -> Result<i64>;

    /// Reads the current value of `namespace` without advancing it. Unset
    /// namespaces read as `0`.
    fn current_id(&self, namespace: &str) -> Result<i64>;

    /// Overwrites the current value of `namespace`; the next
    /// [`SequenceGenerator::next_id`] continues from `value`. Returns `false`
    /// if the backend refused or failed the write.
    fn set_value(&self, namespace: &str, value: i64) -> bool;

    fn backend(&self) -> BackendKind;

    /// [`SequenceGenerator::next_id`] for callers that expect a bare integer:
    /// any failure is logged and reported as `-1`.
    fn next_id_or_negative(&self, namespace: &str) -> i64 {
        match self.next_id(namespace) {
            Ok(id) => id,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(namespace, backend = %self.backend(), error = %_e, "next_id failed, returning -1");
                -1
            }
        }
    }
}
