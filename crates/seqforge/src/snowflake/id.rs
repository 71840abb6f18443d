use core::{cmp::Ordering, fmt};

use super::layout::{IdLayout, IdWidth};

/// A clock-sequence ID together with the layout that produced it.
///
/// The raw value is always carried as a `u128` so every variant shares one
/// representation; [`SnowflakeId::to_i64`] narrows the variants that fit a
/// signed 64-bit integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnowflakeId {
    raw: u128,
    width: IdWidth,
}

impl SnowflakeId {
    pub const fn from_raw(raw: u128, width: IdWidth) -> Self {
        Self { raw, width }
    }

    pub const fn from_components(width: IdWidth, timestamp: u64, node_id: u64, sequence: u64) -> Self {
        Self::from_raw(width.layout().compose(timestamp, node_id, sequence), width)
    }

    pub const fn raw(&self) -> u128 {
        self.raw
    }

    pub const fn width(&self) -> IdWidth {
        self.width
    }

    pub const fn layout(&self) -> &'static IdLayout {
        self.width.layout()
    }

    /// The value as a signed 64-bit integer, or `None` for the 128-bit
    /// variant.
    pub const fn to_i64(&self) -> Option<i64> {
        if self.layout().width <= 64 {
            // The reserved top bit keeps the value below `i64::MAX`.
            Some(self.raw as i64)
        } else {
            None
        }
    }

    /// Timestamp field in layout ticks since the layout epoch.
    pub const fn timestamp(&self) -> u64 {
        self.layout().timestamp(self.raw)
    }

    /// Generation instant as Unix milliseconds, truncated to the layout tick.
    pub const fn timestamp_millis(&self) -> u64 {
        self.layout().extract_timestamp(self.raw)
    }

    pub const fn node_id(&self) -> u64 {
        self.layout().node_id(self.raw)
    }

    pub const fn sequence(&self) -> u64 {
        self.layout().sequence(self.raw)
    }

    fn fields(&self) -> [(&'static str, u32, u128); 4] {
        let layout = self.layout();
        let reserved = self.raw >> (layout.width - layout.reserved_bits);
        [
            ("reserved", layout.reserved_bits, reserved),
            ("timestamp", layout.timestamp_bits, u128::from(self.timestamp())),
            ("node", layout.node_bits, u128::from(self.node_id())),
            ("sequence", layout.sequence_bits, u128::from(self.sequence())),
        ]
    }
}

impl PartialOrd for SnowflakeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SnowflakeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.width
            .cmp(&other.width)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<[String; 3]> = self
            .fields()
            .iter()
            .map(|(name, bits, value)| {
                [
                    format!("{name} ({bits})"),
                    value.to_string(),
                    format!("0x{value:x}"),
                ]
            })
            .collect();
        let widths: Vec<usize> = cells
            .iter()
            .map(|cell| cell.iter().map(String::len).max().unwrap_or(0) + 2)
            .collect();

        let border = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            write!(f, "        +")?;
            for &w in &widths {
                write!(f, "{}+", "-".repeat(w))?;
            }
            writeln!(f)
        };
        let row = |f: &mut fmt::Formatter<'_>, column: usize| -> fmt::Result {
            write!(f, "        |")?;
            for (cell, &w) in cells.iter().zip(&widths) {
                write!(f, "{:^w$}|", cell[column])?;
            }
            writeln!(f)
        };

        let hex_digits = (self.layout().width as usize).div_ceil(4);
        writeln!(f, "SnowflakeId<{}> {{", self.layout().name)?;
        writeln!(f, "    raw id     : 0x{:0hex_digits$x} ({})", self.raw, self.raw)?;
        writeln!(f, "    unix ms    : {}", self.timestamp_millis())?;
        writeln!(f, "    layout     :")?;
        border(f)?;
        row(f, 0)?;
        border(f)?;
        row(f, 1)?;
        row(f, 2)?;
        border(f)?;
        write!(f, "}}")
    }
}
