use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct StopState {
    stopped: Mutex<bool>,
    signal: Condvar,
}

/// A one-shot cancellation flag shared between a blocking subscription and
/// whoever wants to end it.
///
/// Cloning yields another handle to the same flag. Cancelling is idempotent
/// and wakes every thread parked in [`StopToken::wait_timeout`].
#[derive(Clone, Default)]
pub struct StopToken {
    state: Arc<StopState>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut stopped = self.state.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.state.signal.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.stopped.lock()
    }

    /// Parks until cancelled or `timeout` elapses. Returns `true` if the
    /// token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.state.stopped.lock();
        if !*stopped {
            let _ = self.state.signal.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    /// Whether two handles refer to the same flag.
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl core::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StopToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
