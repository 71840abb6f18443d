use core::{cmp::Ordering, time::Duration};
use std::thread;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{
    id::SnowflakeId,
    layout::{FULL_64, IdLayout, IdWidth},
};
use crate::{Error, Result, SystemClock, TimeSource};

/// Settings for a [`ClockSequence`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClockSequenceConfig {
    /// Identifies this generator among every generator sharing a layout. Must
    /// fit the 64-bit layout's node field.
    pub node_id: u64,
    /// How far the clock may step backwards before generation fails. Within
    /// the tolerance the generator waits for the clock to catch up.
    pub regression_tolerance: Duration,
}

impl ClockSequenceConfig {
    pub fn new(node_id: u64) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    pub fn with_regression_tolerance(mut self, tolerance: Duration) -> Self {
        self.regression_tolerance = tolerance;
        self
    }
}

/// Outcome of one attempt to advance a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poll {
    Ready { raw: u128 },
    /// The sequence is spent (or the clock is inside the regression
    /// tolerance): retry once the clock reaches `resume_at_ms`.
    Pending { resume_at_ms: u64 },
}

/// Last issued state for one ID width.
#[derive(Debug, Clone, Copy, Default)]
struct Lane {
    last_timestamp: Option<u64>,
    sequence: u64,
}

#[cfg(feature = "cache-padded")]
type LaneCell = crossbeam_utils::CachePadded<Mutex<Lane>>;
#[cfg(not(feature = "cache-padded"))]
type LaneCell = Mutex<Lane>;

fn new_lane() -> LaneCell {
    #[cfg(feature = "cache-padded")]
    {
        crossbeam_utils::CachePadded::new(Mutex::new(Lane::default()))
    }
    #[cfg(not(feature = "cache-padded"))]
    {
        Mutex::new(Lane::default())
    }
}

/// A Snowflake-style clock-sequence generator covering every [`IdWidth`].
///
/// Each width keeps its own `(last timestamp, sequence)` lane behind its own
/// lock, so concurrent callers of different widths never contend. Within a
/// lane IDs are strictly increasing: a call in the same tick bumps the
/// sequence, a later tick resets it to zero, and an exhausted sequence waits
/// for the next tick.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ No external coordination beyond a unique node id
/// - ✅ Detects wall-clock regressions instead of reissuing IDs
///
/// ## Recommended When
/// - IDs must be unique across processes without a shared store
/// - Roughly time-ordered IDs are useful to readers
///
/// ## See Also
/// - [`CounterSequence`] for dense per-namespace counters
///
/// [`CounterSequence`]: crate::CounterSequence
pub struct ClockSequence<T: TimeSource = SystemClock> {
    nodes: [u64; IdWidth::COUNT],
    tolerance_ms: u64,
    lanes: [LaneCell; IdWidth::COUNT],
    time: T,
}

impl ClockSequence<SystemClock> {
    /// Creates a wall-clock generator for `node_id`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `node_id` does not fit the 64-bit
    /// layout's node field.
    ///
    /// # Example
    /// ```
    /// use seqforge::ClockSequence;
    ///
    /// let generator = ClockSequence::new(1).unwrap();
    /// let a = generator.generate_id64().unwrap();
    /// let b = generator.generate_id64().unwrap();
    /// assert!(b > a);
    /// ```
    pub fn new(node_id: u64) -> Result<Self> {
        Self::with_time(ClockSequenceConfig::new(node_id), SystemClock)
    }
}

impl<T: TimeSource> ClockSequence<T> {
    /// Creates a generator that reads time from `time`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the node id does not fit the
    /// 64-bit layout's node field.
    pub fn with_time(config: ClockSequenceConfig, time: T) -> Result<Self> {
        let node_id = config.node_id;
        if node_id > FULL_64.max_node_id() {
            return Err(Error::config(format!(
                "node id {node_id} exceeds the {}-bit node field (max = {})",
                FULL_64.node_bits,
                FULL_64.max_node_id()
            )));
        }

        let nodes = IdWidth::ALL.map(|width| {
            let layout = width.layout();
            let kept = node_id & layout.max_node_id();
            if kept != node_id {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    node_id,
                    kept,
                    layout = layout.name,
                    "node id truncated to fit the layout's node field"
                );
            }
            kept
        });

        Ok(Self {
            nodes,
            tolerance_ms: u64::try_from(config.regression_tolerance.as_millis())
                .unwrap_or(u64::MAX),
            lanes: core::array::from_fn(|_| new_lane()),
            time,
        })
    }

    /// Node id as configured (before any per-layout truncation).
    pub fn node_id(&self) -> u64 {
        self.nodes[IdWidth::Full64.index()]
    }

    /// Generates the next ID of the given width, waiting out sequence
    /// exhaustion.
    ///
    /// # Errors
    /// - [`Error::ClockRegression`] if the clock reads earlier than the last
    ///   issued timestamp by more than the configured tolerance.
    /// - [`Error::ClockBeforeEpoch`] / [`Error::TimestampOverflow`] if the
    ///   clock falls outside the layout's range.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate(&self, width: IdWidth) -> Result<SnowflakeId> {
        let layout = width.layout();
        let node = self.nodes[width.index()];
        let mut lane = self.lanes[width.index()].lock();
        loop {
            let now = self.time.current_millis();
            match Self::poll(&mut lane, layout, node, now, self.tolerance_ms)? {
                Poll::Ready { raw } => return Ok(SnowflakeId::from_raw(raw, width)),
                Poll::Pending { resume_at_ms } => Self::backoff(now, resume_at_ms),
            }
        }
    }

    /// 64-bit ID: 19 decimal digits.
    pub fn generate_id64(&self) -> Result<i64> {
        self.generate_narrow(IdWidth::Full64)
    }

    /// Reduced 48-bit ID.
    pub fn generate_id48(&self) -> Result<i64> {
        self.generate_narrow(IdWidth::Reduced48)
    }

    /// Mini ID: 13 decimal digits.
    pub fn generate_id_mini(&self) -> Result<i64> {
        self.generate_narrow(IdWidth::Mini)
    }

    /// Tiny ID: 12 decimal digits, one-second resolution.
    pub fn generate_id_tiny(&self) -> Result<i64> {
        self.generate_narrow(IdWidth::Tiny)
    }

    /// 128-bit ID.
    pub fn generate_id128(&self) -> Result<u128> {
        self.generate(IdWidth::Wide128).map(|id| id.raw())
    }

    /// The most recent ID this generator issued for `width`, if any.
    pub fn last_generated(&self, width: IdWidth) -> Option<SnowflakeId> {
        let lane = self.lanes[width.index()].lock();
        lane.last_timestamp.map(|ts| {
            SnowflakeId::from_components(width, ts, self.nodes[width.index()], lane.sequence)
        })
    }

    fn generate_narrow(&self, width: IdWidth) -> Result<i64> {
        let id = self.generate(width)?;
        id.to_i64()
            .ok_or_else(|| Error::config(format!("layout `{width}` does not fit a 64-bit integer")))
    }

    fn poll(
        lane: &mut Lane,
        layout: &IdLayout,
        node: u64,
        now_ms: u64,
        tolerance_ms: u64,
    ) -> Result<Poll> {
        let now = layout.ticks_at(now_ms)?;
        let Some(last) = lane.last_timestamp else {
            lane.last_timestamp = Some(now);
            lane.sequence = 0;
            return Ok(Poll::Ready {
                raw: layout.compose(now, node, 0),
            });
        };

        match now.cmp(&last) {
            Ordering::Equal => {
                if lane.sequence < layout.max_sequence() {
                    lane.sequence += 1;
                    Ok(Poll::Ready {
                        raw: layout.compose(last, node, lane.sequence),
                    })
                } else {
                    Ok(Poll::Pending {
                        resume_at_ms: layout.tick_start_millis(last + 1),
                    })
                }
            }
            Ordering::Greater => {
                lane.last_timestamp = Some(now);
                lane.sequence = 0;
                Ok(Poll::Ready {
                    raw: layout.compose(now, node, 0),
                })
            }
            Ordering::Less => Self::cold_clock_behind(layout, last, now_ms, tolerance_ms),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(
        layout: &IdLayout,
        last: u64,
        now_ms: u64,
        tolerance_ms: u64,
    ) -> Result<Poll> {
        let last_ms = layout.tick_start_millis(last);
        if last_ms - now_ms <= tolerance_ms {
            return Ok(Poll::Pending {
                resume_at_ms: last_ms,
            });
        }
        #[cfg(feature = "tracing")]
        tracing::error!(
            layout = layout.name,
            last_ms,
            now_ms,
            "clock moved backwards, refusing to generate"
        );
        Err(Error::ClockRegression { last_ms, now_ms })
    }

    fn backoff(now_ms: u64, resume_at_ms: u64) {
        match resume_at_ms.saturating_sub(now_ms) {
            0 | 1 => thread::yield_now(),
            wait => thread::sleep(Duration::from_millis(wait - 1)),
        }
    }
}
