//! Core types for bzrange

use crate::timestamp::DateFormat;
use crate::{RangeError, Result};
use serde::Serialize;
use std::fmt;

/// Timestamp in seconds since Unix epoch
pub type Timestamp = i64;

/// Absolute bit offset from the start of the compressed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BitPosition(u64);

impl BitPosition {
    /// Position of the first block of a file, right after the 32-bit stream header
    pub const FIRST_BLOCK: BitPosition = BitPosition(crate::config::FIRST_BLOCK_BIT);

    /// Create from an absolute bit count
    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Create from a bit offset measured from `origin` (a byte offset)
    pub fn from_relative(origin: u64, relative_bits: u64) -> Self {
        Self(origin * 8 + relative_bits)
    }

    /// Absolute bit count
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Byte containing the first bit
    pub fn byte_offset(&self) -> u64 {
        self.0 / 8
    }

    /// Bit index inside `byte_offset()`, 0..=7, MSB first
    pub fn bit_in_byte(&self) -> u8 {
        (self.0 % 8) as u8
    }

    /// Offset relative to `origin`, if the position is not before it
    pub fn relative_to(&self, origin: u64) -> Option<u64> {
        self.0.checked_sub(origin * 8)
    }

    /// Whether this is the first block of the file
    pub fn is_first_block(&self) -> bool {
        *self == Self::FIRST_BLOCK
    }
}

impl fmt::Display for BitPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (byte {}, bit {})", self.0, self.byte_offset(), self.bit_in_byte())
    }
}

/// A datetime literal together with its epoch value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stamp {
    /// Text exactly as it appears in the log or on the command line
    pub literal: String,
    /// Parsed value
    pub epoch: Timestamp,
}

impl Stamp {
    /// Create a new stamp
    pub fn new(literal: impl Into<String>, epoch: Timestamp) -> Self {
        Self {
            literal: literal.into(),
            epoch,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

/// Requested extraction interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the range (inclusive)
    pub from: Stamp,
    /// End of the range
    pub to: Stamp,
    /// Format both literals were written in
    pub format: DateFormat,
}

impl TimeRange {
    /// Parse the `--from`/`--to` literals.
    ///
    /// Both must be written in the same recognised format with the same byte
    /// length, and `from` must be strictly earlier than `to`.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let (format, from_epoch) = DateFormat::recognize(from)?;
        let (to_format, to_epoch) = DateFormat::recognize(to)?;

        if format != to_format {
            return Err(RangeError::Format(format!(
                "values of --from ({}) and --to ({}) were not set in the same datetime format",
                format.pattern(),
                to_format.pattern()
            )));
        }

        if from.len() != to.len() {
            return Err(RangeError::Format(format!(
                "--from ({:?}) and --to ({:?}) must have the same length",
                from, to
            )));
        }

        if from_epoch >= to_epoch {
            return Err(RangeError::Order {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        Ok(Self {
            from: Stamp::new(from, from_epoch),
            to: Stamp::new(to, to_epoch),
            format,
        })
    }

    /// Byte width of the datetime window used for every scan
    pub fn width(&self) -> usize {
        self.from.literal.len()
    }
}
