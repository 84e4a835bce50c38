//! Time range extraction
//!
//! [`RangeExtractor`] is the driver: it parses the requested range, opens a
//! [`DecodeCursor`] over the file, runs the [`RangeLocator`] and hands the
//! result to the [`RangeEmitter`].

mod emitter;
mod locator;

pub use emitter::{EmitReport, RangeEmitter};
pub use locator::{block_bounds, FileBounds, Location, RangeLocator};

use crate::bz2::DecodeEngine;
use crate::cursor::DecodeCursor;
use crate::timestamp::{ColumnPolicy, TimestampExtractor};
use crate::{BitPosition, RangeError, Result, Stamp, TimeRange};
use serde::Serialize;
use std::io::{Read, Seek, Write};
use std::ops::ControlFlow;

/// Extraction configuration
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Decoded bytes per chunk, also the scanner's read size
    pub chunk_size: usize,
    /// Backward step when probing for the last block
    pub probe_step: u64,
    /// Backward stride when looking for the block before another
    pub correction_stride: u64,
    /// Where datetimes sit inside lines
    pub column: ColumnPolicy,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::CHUNK_SIZE,
            probe_step: crate::config::LAST_BLOCK_PROBE_STEP,
            correction_stride: crate::config::CHUNK_SIZE as u64,
            column: ColumnPolicy::Detect,
        }
    }
}

impl ExtractConfig {
    /// Reject settings the search cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RangeError::Usage("chunk size must be positive".into()));
        }
        if self.probe_step == 0 {
            return Err(RangeError::Usage("probe step must be positive".into()));
        }
        if self.correction_stride == 0 {
            return Err(RangeError::Usage("correction stride must be positive".into()));
        }
        Ok(())
    }
}

/// Summary of one extraction, serialisable for `--plan`
#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    /// Datetime pattern the range was written in
    pub format: &'static str,
    /// Requested start
    pub from: Stamp,
    /// Requested end
    pub to: Stamp,
    /// Column of the datetime inside each line
    pub column: Option<usize>,
    /// Search result
    pub location: Location,
    /// Emit result; absent for a plan
    pub emitted: Option<EmitReport>,
}

/// Extracts time ranges from bzip2 log files
#[derive(Debug, Clone, Default)]
pub struct RangeExtractor {
    config: ExtractConfig,
}

impl RangeExtractor {
    /// Create an extractor
    pub fn new(config: ExtractConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Locate the range without writing anything
    pub fn plan<R: Read + Seek>(&self, reader: R, from: &str, to: &str) -> Result<ExtractReport> {
        let range = TimeRange::parse(from, to)?;
        let mut cursor = DecodeCursor::open(reader, self.config.chunk_size)?;
        let mut extractor = self.extractor(&range);

        let location = RangeLocator::new(&self.config).locate(&mut cursor, &mut extractor, &range)?;
        Ok(self.report(&range, &extractor, location, None))
    }

    /// Write every block covering `[from, to]` to `sink`
    pub fn extract<R, W>(&self, reader: R, from: &str, to: &str, sink: &mut W) -> Result<ExtractReport>
    where
        R: Read + Seek,
        W: Write,
    {
        let range = TimeRange::parse(from, to)?;
        let mut cursor = DecodeCursor::open(reader, self.config.chunk_size)?;
        let mut extractor = self.extractor(&range);

        let location = RangeLocator::new(&self.config).locate(&mut cursor, &mut extractor, &range)?;
        let emitted = RangeEmitter::new(&extractor).emit(&mut cursor, &location, &range, sink)?;
        Ok(self.report(&range, &extractor, location, Some(emitted)))
    }

    fn extractor(&self, range: &TimeRange) -> TimestampExtractor {
        TimestampExtractor::new(range.format, range.width(), self.config.column)
    }

    fn report(
        &self,
        range: &TimeRange,
        extractor: &TimestampExtractor,
        location: Location,
        emitted: Option<EmitReport>,
    ) -> ExtractReport {
        ExtractReport {
            format: range.format.pattern(),
            from: range.from.clone(),
            to: range.to.clone(),
            column: extractor.column(),
            location,
            emitted,
        }
    }
}

/// Whether the block at `pos` has a line carrying `literal` at the
/// extractor's column. Text before the block's first newline only counts
/// with `at_line_start`.
pub fn block_contains_literal<R, E>(
    cursor: &mut DecodeCursor<R, E>,
    extractor: &TimestampExtractor,
    pos: BitPosition,
    literal: &str,
    at_line_start: bool,
) -> Result<bool>
where
    R: Read + Seek,
    E: DecodeEngine,
{
    let mut matcher = extractor.literal_matcher(literal.as_bytes(), at_line_start);
    cursor.scan_block(pos, |chunk| {
        Ok(if matcher.feed(chunk) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        })
    })
}
