use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{ClientFactory, PoolConfig};
use crate::{Error, Result, StopToken};

pub(crate) type ClientId = u64;

/// A client on loan from the pool, tagged with its pool-unique id.
pub(crate) struct Lease<C> {
    pub(crate) id: ClientId,
    pub(crate) client: C,
}

struct Idle<C> {
    id: ClientId,
    client: C,
}

struct PoolState<C> {
    /// Oldest at the front; borrowers take from the back.
    idle: VecDeque<Idle<C>>,
    /// Idle + borrowed + currently being created or probed.
    total: usize,
    closed: bool,
    next_id: ClientId,
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub destroyed: usize,
    pub created: usize,
}

/// The generic bounded pool.
///
/// Clients are created lazily up to `max_active`. A borrower that finds the
/// pool at its bound parks on `available` until a client is returned or
/// destroyed, or `max_wait_ms` elapses. Factory calls (create, validate,
/// destroy) always run with the state lock released.
pub(crate) struct ObjectPool<F: ClientFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Client>>,
    available: Condvar,
    /// Cancelled on close; the maintainer parks on it between passes.
    stop: StopToken,
}

impl<F: ClientFactory> ObjectPool<F> {
    pub(crate) fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                closed: false,
                next_id: 0,
            }),
            available: Condvar::new(),
            stop: StopToken::new(),
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn borrow(&self) -> Result<Lease<F::Client>> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait();
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }

            if let Some(Idle { id, mut client }) = state.idle.pop_back() {
                if !self.config.test_on_borrow {
                    return Ok(Lease { id, client });
                }
                let valid = MutexGuard::unlocked(&mut state, || self.factory.validate(&mut client));
                if valid {
                    return Ok(Lease { id, client });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(client = id, "idle client failed validation on borrow");
                state.total -= 1;
                MutexGuard::unlocked(&mut state, || self.destroy(client));
                continue;
            }

            if state.total < self.config.max_active {
                state.total += 1;
                let id = state.next_id;
                state.next_id += 1;
                return match MutexGuard::unlocked(&mut state, || self.create_checked()) {
                    Ok(client) => Ok(Lease { id, client }),
                    Err(e) => {
                        state.total -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            if self.available.wait_until(&mut state, deadline).timed_out()
                && state.idle.is_empty()
                && state.total >= self.config.max_active
                && !state.closed
            {
                return Err(Error::PoolExhausted {
                    waited_ms: duration_ms(started.elapsed()),
                });
            }
        }
    }

    /// Takes a client back. Broken clients, clients failing the return
    /// probe, and clients beyond `max_idle` are destroyed.
    pub(crate) fn give_back(&self, lease: Lease<F::Client>, healthy: bool) {
        let Lease { id, mut client } = lease;
        let keep = healthy && (!self.config.test_on_return || self.factory.validate(&mut client));

        let mut state = self.state.lock();
        if keep && !state.closed && state.idle.len() < self.config.effective_max_idle() {
            state.idle.push_back(Idle { id, client });
            drop(state);
            self.available.notify_one();
            return;
        }

        #[cfg(feature = "tracing")]
        if !state.closed {
            tracing::debug!(client = id, healthy, keep, "destroying returned client");
        }
        state.total -= 1;
        drop(state);
        self.destroy(client);
        self.available.notify_one();
    }

    /// One maintenance pass: destroys idle clients beyond `max_idle`, probes
    /// the rest when `test_while_idle` is set, and backfills to `min_idle`.
    pub(crate) fn evict(&self) -> EvictionReport {
        let mut report = EvictionReport::default();

        let (surplus, probe) = {
            let mut state = self.state.lock();
            if state.closed {
                return report;
            }
            let keep = self.config.effective_max_idle();
            let excess = state.idle.len().saturating_sub(keep);
            let surplus: Vec<_> = state.idle.drain(..excess).collect();
            state.total -= surplus.len();
            let probe: Vec<_> = if self.config.test_while_idle {
                state.idle.drain(..).collect()
            } else {
                Vec::new()
            };
            (surplus, probe)
        };

        for idle in surplus {
            self.destroy(idle.client);
            report.destroyed += 1;
        }

        if !probe.is_empty() {
            let mut healthy = Vec::with_capacity(probe.len());
            let mut failed = 0;
            for mut idle in probe {
                if self.factory.validate(&mut idle.client) {
                    healthy.push(idle);
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(client = idle.id, "idle client failed validation");
                    self.destroy(idle.client);
                    failed += 1;
                }
            }
            report.destroyed += failed;

            let mut state = self.state.lock();
            state.total -= failed;
            if state.closed {
                state.total -= healthy.len();
                drop(state);
                for idle in healthy {
                    self.destroy(idle.client);
                }
            } else {
                for idle in healthy.into_iter().rev() {
                    state.idle.push_front(idle);
                }
                drop(state);
                self.available.notify_all();
            }
        }

        self.ensure_min_idle(&mut report);
        report
    }

    fn ensure_min_idle(&self, report: &mut EvictionReport) {
        let min_idle = self.config.effective_min_idle();
        loop {
            let id = {
                let mut state = self.state.lock();
                if state.closed
                    || state.idle.len() >= min_idle
                    || state.total >= self.config.max_active
                {
                    return;
                }
                state.total += 1;
                let id = state.next_id;
                state.next_id += 1;
                id
            };

            match self.create_checked() {
                Ok(client) => {
                    let mut state = self.state.lock();
                    if state.closed {
                        state.total -= 1;
                        drop(state);
                        self.destroy(client);
                        return;
                    }
                    state.idle.push_back(Idle { id, client });
                    drop(state);
                    self.available.notify_one();
                    report.created += 1;
                }
                Err(_e) => {
                    self.state.lock().total -= 1;
                    self.available.notify_one();
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, "failed to backfill idle clients");
                    return;
                }
            }
        }
    }

    pub(crate) fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Closes the pool and destroys every idle client. Borrowed clients are
    /// destroyed when they come back. Returns the number destroyed now.
    pub(crate) fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        self.available.notify_all();
        self.stop.cancel();

        let count = drained.len();
        for idle in drained {
            self.destroy(idle.client);
        }
        count
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// `(idle, total)` counts.
    pub(crate) fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.idle.len(), state.total)
    }

    fn create_checked(&self) -> Result<F::Client> {
        let mut client = self
            .factory
            .create()
            .map_err(|e| Error::unavailable(format!("cannot open client: {e}")))?;
        if self.config.test_on_create && !self.factory.validate(&mut client) {
            self.destroy(client);
            return Err(Error::unavailable("new client failed validation"));
        }
        Ok(client)
    }

    fn destroy(&self, client: F::Client) {
        self.factory.destroy(client);
    }
}

impl<F: ClientFactory> Drop for ObjectPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
