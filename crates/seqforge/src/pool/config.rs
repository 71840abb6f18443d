use core::{
    hash::{Hash, Hasher},
    time::Duration,
};
use std::collections::hash_map::DefaultHasher;

use crate::{Error, Result};

pub const DEFAULT_MAX_ACTIVE: usize = 8;
pub const DEFAULT_MAX_IDLE: usize = 1 + DEFAULT_MAX_ACTIVE / 2;
pub const DEFAULT_MIN_IDLE: usize = 1 + DEFAULT_MAX_ACTIVE / 4;
pub const DEFAULT_MAX_WAIT_MS: u64 = 3_000;
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 10_000;

/// Sizing and health-check policy of one client pool.
///
/// Two configs with equal fields produce the same [`PoolConfig::digest`], so
/// callers asking the registry for the same endpoint with an equal config
/// share a pool.
///
/// # Example
/// ```
/// use seqforge::PoolConfig;
///
/// let config = PoolConfig::default().with_max_active(2).with_max_wait_ms(50);
/// assert_eq!(config.max_active, 2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Upper bound on clients alive at once (idle plus borrowed).
    pub max_active: usize,
    /// Idle clients beyond this are destroyed on return or eviction.
    pub max_idle: usize,
    /// The maintainer backfills idle clients up to this count.
    pub min_idle: usize,
    /// Longest a borrower waits for a client before failing.
    pub max_wait_ms: u64,
    /// Probe a client before handing it out.
    pub test_on_borrow: bool,
    /// Probe a freshly created client before first use.
    pub test_on_create: bool,
    /// Probe idle clients during eviction sweeps.
    pub test_while_idle: bool,
    /// Probe a client when it is returned.
    pub test_on_return: bool,
    /// Period of the background eviction sweep.
    pub eviction_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            min_idle: DEFAULT_MIN_IDLE,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            test_on_borrow: false,
            test_on_create: true,
            test_while_idle: true,
            test_on_return: false,
            eviction_interval_ms: DEFAULT_EVICTION_INTERVAL_MS,
        }
    }
}

impl PoolConfig {
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_create(mut self, enabled: bool) -> Self {
        self.test_on_create = enabled;
        self
    }

    pub fn with_test_while_idle(mut self, enabled: bool) -> Self {
        self.test_while_idle = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_eviction_interval_ms(mut self, interval_ms: u64) -> Self {
        self.eviction_interval_ms = interval_ms;
        self
    }

    /// Checks the config can back a pool.
    ///
    /// `max_idle` and `min_idle` above `max_active` are not errors; the pool
    /// clamps them.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `max_active` or
    /// `eviction_interval_ms` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_active == 0 {
            return Err(Error::config("max_active must be greater than 0"));
        }
        if self.eviction_interval_ms == 0 {
            return Err(Error::config("eviction_interval_ms must be greater than 0"));
        }
        Ok(())
    }

    /// Stable digest of every field, used in pool identity.
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    pub(crate) fn effective_max_idle(&self) -> usize {
        self.max_idle.min(self.max_active)
    }

    pub(crate) fn effective_min_idle(&self) -> usize {
        self.min_idle.min(self.effective_max_idle())
    }

    pub(crate) fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub(crate) fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}
