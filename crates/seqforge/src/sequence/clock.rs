use super::{BackendKind, SequenceGenerator};
use crate::{ClockSequence, IdWidth, Namespace, Result, TimeSource};

/// The namespace is validated and otherwise ignored: one instance issues a
/// single time-ordered stream of `Full64` ids. `current_id` reports the last
/// id this instance issued and `set_value` is unsupported.
impl<T: TimeSource> SequenceGenerator for ClockSequence<T> {
    fn next_id(&self, namespace: &str) -> Result<i64> {
        Namespace::parse(namespace)?;
        self.generate_id64()
    }

    fn current_id(&self, namespace: &str) -> Result<i64> {
        Namespace::parse(namespace)?;
        Ok(self
            .last_generated(IdWidth::Full64)
            .and_then(|id| id.to_i64())
            .unwrap_or(0))
    }

    fn set_value(&self, _namespace: &str, _value: i64) -> bool {
        #[cfg(feature = "tracing")]
        tracing::warn!(namespace = _namespace, "set_value is not supported by the clock backend");
        false
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Clock
    }
}
