use core::{fmt, str::FromStr, time::Duration};

use crate::{Error, Result};

/// Epoch of the 64-bit and 128-bit layouts: Thursday, March 1, 2012 00:00:00 UTC
pub const FULL_EPOCH: Duration = Duration::from_millis(1_330_560_000_000);

/// Epoch of the reduced 48-bit layout: Wednesday, January 1, 2020 00:00:00 UTC
pub const REDUCED_EPOCH: Duration = Duration::from_millis(1_577_836_800_000);

/// Epoch of the mini layout: Thursday, January 1, 2015 00:00:00 UTC
pub const MINI_EPOCH: Duration = Duration::from_millis(1_420_070_400_000);

/// Epoch of the tiny layout: Friday, January 1, 2010 00:00:00 UTC
pub const TINY_EPOCH: Duration = Duration::from_millis(1_262_304_000_000);

/// Bit layout of one clock-sequence ID variant.
///
/// From most to least significant bit an ID is laid out as:
///
/// ```text
/// | reserved | timestamp (ticks since epoch) | node id | sequence |
/// ```
///
/// The reserved bits are always zero, so the value stays non-negative when it
/// is carried in a signed integer of `width` bits. A layout is part of the
/// wire contract: once IDs have been handed out its fields must not change or
/// previously issued IDs decode to the wrong instant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdLayout {
    pub name: &'static str,
    /// Origin of the timestamp field.
    pub epoch: Duration,
    /// Duration of one timestamp tick.
    pub tick: Duration,
    pub width: u32,
    pub reserved_bits: u32,
    pub timestamp_bits: u32,
    pub node_bits: u32,
    pub sequence_bits: u32,
}

/// 64-bit layout: 41-bit millisecond timestamp, 10-bit node, 12-bit sequence.
/// Always 19 decimal digits for the lifetime of the layout.
pub const FULL_64: IdLayout = IdLayout {
    name: "full64",
    epoch: FULL_EPOCH,
    tick: Duration::from_millis(1),
    width: 64,
    reserved_bits: 1,
    timestamp_bits: 41,
    node_bits: 10,
    sequence_bits: 12,
};

/// 48-bit layout: 40-bit millisecond timestamp, 3-bit node, 4-bit sequence.
pub const REDUCED_48: IdLayout = IdLayout {
    name: "reduced48",
    epoch: REDUCED_EPOCH,
    tick: Duration::from_millis(1),
    width: 48,
    reserved_bits: 1,
    timestamp_bits: 40,
    node_bits: 3,
    sequence_bits: 4,
};

/// Mini layout: 37-bit timestamp in 10 ms ticks, 2-bit node, 4-bit sequence.
/// 13 decimal digits from 2020 until the timestamp field runs out in 2058.
pub const MINI: IdLayout = IdLayout {
    name: "mini",
    epoch: MINI_EPOCH,
    tick: Duration::from_millis(10),
    width: 44,
    reserved_bits: 1,
    timestamp_bits: 37,
    node_bits: 2,
    sequence_bits: 4,
};

/// Tiny layout: 31-bit timestamp in seconds, 2-bit node, 6-bit sequence.
/// 12 decimal digits from mid-2022 until 2078.
pub const TINY: IdLayout = IdLayout {
    name: "tiny",
    epoch: TINY_EPOCH,
    tick: Duration::from_secs(1),
    width: 40,
    reserved_bits: 1,
    timestamp_bits: 31,
    node_bits: 2,
    sequence_bits: 6,
};

/// 128-bit layout: 40 reserved bits, 48-bit millisecond timestamp, 20-bit
/// node, 20-bit sequence.
pub const WIDE_128: IdLayout = IdLayout {
    name: "wide128",
    epoch: FULL_EPOCH,
    tick: Duration::from_millis(1),
    width: 128,
    reserved_bits: 40,
    timestamp_bits: 48,
    node_bits: 20,
    sequence_bits: 20,
};

const _: () = {
    assert!(FULL_64.is_well_formed());
    assert!(REDUCED_48.is_well_formed());
    assert!(MINI.is_well_formed());
    assert!(TINY.is_well_formed());
    assert!(WIDE_128.is_well_formed());
};

const fn mask(bits: u32) -> u128 {
    if bits == 0 { 0 } else { (1u128 << bits) - 1 }
}

impl IdLayout {
    /// Fields fill the width exactly, at least one reserved bit keeps the
    /// value non-negative, and every field fits in a `u64`.
    pub const fn is_well_formed(&self) -> bool {
        self.reserved_bits >= 1
            && self.reserved_bits + self.timestamp_bits + self.node_bits + self.sequence_bits
                == self.width
            && self.timestamp_bits <= 64
            && self.node_bits <= 64
            && self.sequence_bits <= 64
            && self.tick.as_millis() > 0
    }

    pub const fn epoch_millis(&self) -> u64 {
        self.epoch.as_millis() as u64
    }

    pub const fn tick_millis(&self) -> u64 {
        self.tick.as_millis() as u64
    }

    pub const fn max_timestamp(&self) -> u64 {
        mask(self.timestamp_bits) as u64
    }

    pub const fn max_node_id(&self) -> u64 {
        mask(self.node_bits) as u64
    }

    pub const fn max_sequence(&self) -> u64 {
        mask(self.sequence_bits) as u64
    }

    const fn node_shift(&self) -> u32 {
        self.sequence_bits
    }

    const fn timestamp_shift(&self) -> u32 {
        self.sequence_bits + self.node_bits
    }

    /// Packs the three fields into a raw ID. Each field is masked to its
    /// width.
    pub const fn compose(&self, timestamp: u64, node_id: u64, sequence: u64) -> u128 {
        ((timestamp as u128 & mask(self.timestamp_bits)) << self.timestamp_shift())
            | ((node_id as u128 & mask(self.node_bits)) << self.node_shift())
            | (sequence as u128 & mask(self.sequence_bits))
    }

    /// Timestamp field of `raw`, in ticks since the epoch.
    pub const fn timestamp(&self, raw: u128) -> u64 {
        ((raw >> self.timestamp_shift()) & mask(self.timestamp_bits)) as u64
    }

    pub const fn node_id(&self, raw: u128) -> u64 {
        ((raw >> self.node_shift()) & mask(self.node_bits)) as u64
    }

    pub const fn sequence(&self, raw: u128) -> u64 {
        (raw & mask(self.sequence_bits)) as u64
    }

    /// Unix milliseconds at which timestamp tick `ticks` starts.
    pub const fn tick_start_millis(&self, ticks: u64) -> u64 {
        self.epoch_millis() + ticks * self.tick_millis()
    }

    /// Recovers the generation instant of `raw` as Unix milliseconds,
    /// truncated to the layout's tick.
    pub const fn extract_timestamp(&self, raw: u128) -> u64 {
        self.tick_start_millis(self.timestamp(raw))
    }

    /// Converts a Unix millisecond reading into this layout's tick count.
    ///
    /// # Errors
    /// - [`Error::ClockBeforeEpoch`] if `unix_millis` precedes the epoch.
    /// - [`Error::TimestampOverflow`] if the tick no longer fits the field.
    pub fn ticks_at(&self, unix_millis: u64) -> Result<u64> {
        let since = unix_millis
            .checked_sub(self.epoch_millis())
            .ok_or(Error::ClockBeforeEpoch {
                now_ms: unix_millis,
                epoch_ms: self.epoch_millis(),
            })?;
        let ticks = since / self.tick_millis();
        if ticks > self.max_timestamp() {
            return Err(Error::TimestampOverflow { layout: self.name });
        }
        Ok(ticks)
    }
}

impl fmt::Debug for IdLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IdLayout({}: {}b = {}r + {}t@{}ms + {}n + {}s)",
            self.name,
            self.width,
            self.reserved_bits,
            self.timestamp_bits,
            self.tick_millis(),
            self.node_bits,
            self.sequence_bits
        )
    }
}

/// The ID variants a clock sequence can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IdWidth {
    Full64,
    Reduced48,
    Mini,
    Tiny,
    Wide128,
}

impl IdWidth {
    pub const COUNT: usize = 5;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Full64,
        Self::Reduced48,
        Self::Mini,
        Self::Tiny,
        Self::Wide128,
    ];

    pub const fn layout(self) -> &'static IdLayout {
        match self {
            Self::Full64 => &FULL_64,
            Self::Reduced48 => &REDUCED_48,
            Self::Mini => &MINI,
            Self::Tiny => &TINY,
            Self::Wide128 => &WIDE_128,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for IdWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout().name)
    }
}

impl FromStr for IdWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full64" | "64" => Ok(Self::Full64),
            "reduced48" | "48" => Ok(Self::Reduced48),
            "mini" => Ok(Self::Mini),
            "tiny" => Ok(Self::Tiny),
            "wide128" | "128" => Ok(Self::Wide128),
            other => Err(Error::config(format!("unknown id width `{other}`"))),
        }
    }
}

/// Generation instant (Unix ms) of a 64-bit ID.
pub const fn extract_timestamp64(id: i64) -> u64 {
    FULL_64.extract_timestamp(id as u64 as u128)
}

/// Generation instant (Unix ms) of a reduced 48-bit ID.
pub const fn extract_timestamp48(id: i64) -> u64 {
    REDUCED_48.extract_timestamp(id as u64 as u128)
}

/// Generation instant (Unix ms, truncated to 10 ms) of a mini ID.
pub const fn extract_timestamp_mini(id: i64) -> u64 {
    MINI.extract_timestamp(id as u64 as u128)
}

/// Generation instant (Unix ms, truncated to the second) of a tiny ID.
pub const fn extract_timestamp_tiny(id: i64) -> u64 {
    TINY.extract_timestamp(id as u64 as u128)
}

/// Generation instant (Unix ms) of a 128-bit ID.
pub const fn extract_timestamp128(id: u128) -> u64 {
    WIDE_128.extract_timestamp(id)
}
