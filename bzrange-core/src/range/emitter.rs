//! Writing the blocks of a located range

use super::{block_contains_literal, Location};
use crate::bz2::DecodeEngine;
use crate::cursor::DecodeCursor;
use crate::timestamp::TimestampExtractor;
use crate::{BitPosition, Result, TimeRange};
use serde::Serialize;
use std::io::{Read, Seek, Write};
use tracing::{debug, info, warn};

/// What the emitter wrote
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmitReport {
    /// Blocks written, in file order
    pub blocks: Vec<BitPosition>,
    /// Decoded bytes written, excluding the trailing newline
    pub bytes: u64,
    /// First block not written, when the range ended before the file did
    pub stopped_at: Option<BitPosition>,
    /// Unwritten blocks past the stop that still carry the `to` literal
    pub to_trailing_blocks: Vec<BitPosition>,
}

/// Decodes blocks from the start of a range until they pass `to`
pub struct RangeEmitter<'a> {
    extractor: &'a TimestampExtractor,
}

impl<'a> RangeEmitter<'a> {
    /// Create an emitter using a column-resolved extractor
    pub fn new(extractor: &'a TimestampExtractor) -> Self {
        Self { extractor }
    }

    /// Write every block from `location.start_block` whose first datetime is
    /// not after `range.to`, followed by a newline
    pub fn emit<R, E, W>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        location: &Location,
        range: &TimeRange,
        sink: &mut W,
    ) -> Result<EmitReport>
    where
        R: Read + Seek,
        E: DecodeEngine,
        W: Write,
    {
        let mut report = EmitReport::default();
        let last_block = location.bounds.last_block;
        let mut block = location.start_block;

        loop {
            let written = cursor.decode_block_to_sink(block, sink)?;
            debug!("Emitted block {} ({} bytes)", block, written);
            report.blocks.push(block);
            report.bytes += written;

            if block >= last_block {
                break;
            }
            let Some(next) = cursor.next_block(block)? else {
                break;
            };

            let head = cursor.decode_first_chunk(next)?;
            match self.extractor.first_stamp(&head, true) {
                Some(first) if first.epoch > range.to.epoch => {
                    debug!("Block {} starts at {}, past {}", next, first, range.to);
                    report.stopped_at = Some(next);
                    break;
                }
                Some(_) => {}
                // nothing datable in the first chunk: a run of continuation
                // lines belongs with the block before it
                None => debug!("Block {} has no datetime in its first chunk", next),
            }
            block = next;
        }

        sink.write_all(b"\n")?;
        sink.flush()?;

        if let Some(stop) = report.stopped_at {
            report.to_trailing_blocks = self.trailing_to_blocks(cursor, stop, last_block, range)?;
        }

        info!(
            "Emitted {} blocks ({} bytes) for {} .. {}",
            report.blocks.len(),
            report.bytes,
            range.from,
            range.to
        );
        Ok(report)
    }

    /// Blocks from `stop` onwards that still contain the `to` literal.
    ///
    /// The line that opens a block is checked too: when a block boundary
    /// falls between lines, a line stamped `to` can open the stopping block
    /// and never be written.
    fn trailing_to_blocks<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        stop: BitPosition,
        last_block: BitPosition,
        range: &TimeRange,
    ) -> Result<Vec<BitPosition>>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let mut trailing = Vec::new();
        let mut block = stop;

        loop {
            if !block_contains_literal(cursor, self.extractor, block, &range.to.literal, true)? {
                break;
            }

            warn!(
                "Block {} also holds lines stamped {}; they were not written",
                block, range.to
            );
            trailing.push(block);

            if block >= last_block {
                break;
            }
            match cursor.next_block(block)? {
                Some(next) => block = next,
                None => break,
            }
        }

        Ok(trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{ExtractConfig, RangeLocator};
    use crate::testutil::{concat_streams, log_lines, stamp};
    use crate::timestamp::ColumnPolicy;
    use std::io::Cursor;

    fn run(parts: &[Vec<u8>], from: i64, to: i64) -> (Vec<u8>, EmitReport) {
        let mut cursor = DecodeCursor::open(Cursor::new(concat_streams(parts)), 256).unwrap();
        let range = TimeRange::parse(&stamp(from), &stamp(to)).unwrap();
        let mut extractor = TimestampExtractor::new(range.format, range.width(), ColumnPolicy::Detect);
        let location = RangeLocator::new(&ExtractConfig::default())
            .locate(&mut cursor, &mut extractor, &range)
            .unwrap();

        let mut out = Vec::new();
        let report = RangeEmitter::new(&extractor)
            .emit(&mut cursor, &location, &range, &mut out)
            .unwrap();
        (out, report)
    }

    #[test]
    fn test_three_block_scenario() {
        let parts = [log_lines(0, 5, 3), log_lines(6, 12, 3), log_lines(13, 20, 3)];
        let (out, report) = run(&parts, 7, 14);

        assert_eq!(report.blocks.len(), 2);
        assert_eq!(report.stopped_at, None);
        let expected = [parts[1].clone(), parts[2].clone(), b"\n".to_vec()].concat();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_stops_before_block_past_to() {
        let parts = [log_lines(0, 5, 3), log_lines(6, 12, 3), log_lines(13, 20, 3)];
        let (out, report) = run(&parts, 1, 9);

        assert_eq!(report.blocks.len(), 2);
        assert!(report.stopped_at.is_some());
        assert!(report.to_trailing_blocks.is_empty());
        assert_eq!(report.bytes as usize, parts[0].len() + parts[1].len());
        assert_eq!(out.len(), parts[0].len() + parts[1].len() + 1);
        assert!(out.ends_with(b"200\n\n"));
    }

    #[test]
    fn test_reports_to_line_opening_the_stop_block() {
        // the single 10:00:12 line after the split opens block 3, whose
        // second line is already past `to`
        let parts = [
            log_lines(0, 5, 3),
            [log_lines(6, 11, 3), log_lines(12, 12, 2)].concat(),
            [log_lines(12, 12, 1), log_lines(13, 20, 3)].concat(),
        ];
        let (_, report) = run(&parts, 7, 12);

        assert_eq!(report.blocks.len(), 1);
        assert_eq!(report.to_trailing_blocks.len(), 1);
        assert_eq!(report.stopped_at, Some(report.to_trailing_blocks[0]));
    }
}
