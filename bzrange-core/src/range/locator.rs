//! Locating the first block of a time range
//!
//! ```text
//! ValidateBounds -> BinarySearch -> CorrectToFirstBlock -> Done
//! ```
//!
//! The binary search runs over byte offsets, each probe decoding the block
//! nearest after the probe byte. It resolves to a block whose visible
//! datetimes bracket `from`; the correction then walks backwards over blocks
//! that still contain the `from` literal, since equal timestamps may span
//! several blocks.

use super::{block_contains_literal, ExtractConfig};
use crate::bz2::DecodeEngine;
use crate::cursor::DecodeCursor;
use crate::timestamp::TimestampExtractor;
use crate::{BitPosition, RangeError, Result, Stamp, TimeRange};
use serde::Serialize;
use std::cmp::Ordering;
use std::io::{Read, Seek};
use tracing::{debug, info};

/// First and last datetimes of the file and where its last block sits
#[derive(Debug, Clone, Serialize)]
pub struct FileBounds {
    /// First datetime of the first block
    pub first: Stamp,
    /// Last datetime of the last block
    pub last: Stamp,
    /// Start of the last block
    pub last_block: BitPosition,
}

/// Outcome of a successful locate
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    /// First block to emit
    pub start_block: BitPosition,
    /// Block the binary search settled on
    pub search_block: BitPosition,
    /// Number of binary search probes
    pub probes: usize,
    /// Blocks stepped back over during correction
    pub corrected_blocks: usize,
    /// File coverage
    pub bounds: FileBounds,
}

/// Finds the first block of a range
#[derive(Debug, Clone)]
pub struct RangeLocator {
    probe_step: u64,
    correction_stride: u64,
}

impl RangeLocator {
    /// Create a locator
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            probe_step: config.probe_step,
            correction_stride: config.correction_stride,
        }
    }

    /// Run the full locate sequence for `range`.
    ///
    /// Detects the datetime column from the first block, so `extractor` must
    /// not have been used on another file.
    pub fn locate<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        extractor: &mut TimestampExtractor,
        range: &TimeRange,
    ) -> Result<Location>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let bounds = self.validate_bounds(cursor, extractor, range)?;
        let (search_block, probes) = self.binary_search(cursor, extractor, range, &bounds)?;
        let (start_block, corrected_blocks) =
            self.correct_to_first_block(cursor, extractor, search_block, &range.from)?;

        info!(
            "Range starts at block {} after {} probes and {} correction steps",
            start_block, probes, corrected_blocks
        );

        Ok(Location {
            start_block,
            search_block,
            probes,
            corrected_blocks,
            bounds,
        })
    }

    /// Read the file's first and last datetimes and reject a range that
    /// reaches outside them
    pub fn validate_bounds<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        extractor: &mut TimestampExtractor,
        range: &TimeRange,
    ) -> Result<FileBounds>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let first_block = BitPosition::FIRST_BLOCK;
        let head = cursor.decode_first_chunk(first_block)?;
        let first = extractor
            .locate_column(&head)
            .ok_or(RangeError::TimestampNotFound {
                position: first_block.bits(),
            })?;
        debug!(
            "First datetime {} at column {:?}",
            first,
            extractor.column()
        );

        let last_block = self.find_last_block(cursor)?;
        let tail = cursor.decode_last_two_chunks(last_block)?;
        let last = extractor
            .last_stamp(&tail.data, tail.whole_block && last_block.is_first_block())
            .ok_or(RangeError::TimestampNotFound {
                position: last_block.bits(),
            })?;
        debug!("Last datetime {} in block {}", last, last_block);

        if range.from.epoch < first.epoch {
            return Err(RangeError::OutOfRange {
                bound: "--from",
                value: range.from.literal.clone(),
                limit: format!("which starts at {}", first),
            });
        }
        if range.to.epoch > last.epoch {
            return Err(RangeError::OutOfRange {
                bound: "--to",
                value: range.to.literal.clone(),
                limit: format!("which ends at {}", last),
            });
        }

        Ok(FileBounds {
            first,
            last,
            last_block,
        })
    }

    /// Start of the last block in the file.
    ///
    /// Probes backwards from the end in `probe_step` increments until a block
    /// marker turns up, then walks forward to the final one.
    pub fn find_last_block<R, E>(&self, cursor: &mut DecodeCursor<R, E>) -> Result<BitPosition>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let file_size = cursor.file_size();
        let mut back = self.probe_step;
        let mut block = loop {
            let probe = file_size.saturating_sub(back);
            if let Some(block) = cursor.try_locate_block(probe)? {
                break block;
            }
            if probe == 0 {
                return Err(RangeError::BoundaryNotFound { start: 0 });
            }
            back += self.probe_step;
        };

        while let Some(next) = cursor.next_block(block)? {
            block = next;
        }
        Ok(block)
    }

    /// Binary search over byte offsets for a block whose datetimes bracket
    /// `from`. Returns the block and the number of probes.
    ///
    /// If no block brackets `from` (it falls in a gap between blocks), the
    /// earliest block seen that starts after `from` is used, falling back to
    /// the last block.
    pub fn binary_search<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        extractor: &TimestampExtractor,
        range: &TimeRange,
        bounds: &FileBounds,
    ) -> Result<(BitPosition, usize)>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let from = range.from.epoch;
        let mut low = 0u64;
        let mut high = cursor.file_size().saturating_sub(1);
        let mut candidate: Option<BitPosition> = None;
        let mut probes = 0;

        while low <= high {
            let mid = low + (high - low) / 2;
            probes += 1;

            let Some(block) = cursor.try_locate_block(mid)? else {
                debug!("Probe at byte {}: no block follows", mid);
                if mid == 0 {
                    break;
                }
                high = mid - 1;
                continue;
            };

            let (first, last) = block_bounds(cursor, extractor, block)?;
            debug!(
                "Probe at byte {}: block {} spans {} .. {}",
                mid, block, first, last
            );

            match from.cmp(&first.epoch) {
                Ordering::Equal => return Ok((block, probes)),
                Ordering::Greater if from <= last.epoch => return Ok((block, probes)),
                Ordering::Greater => {
                    // every probe byte up to this block resolves to it again
                    low = mid.max(block.byte_offset()) + 1;
                }
                Ordering::Less => {
                    candidate = Some(candidate.map_or(block, |c| c.min(block)));
                    if mid == 0 {
                        break;
                    }
                    high = mid - 1;
                }
            }
        }

        let fallback = candidate.unwrap_or(bounds.last_block);
        debug!(
            "No block brackets {}; continuing from block {}",
            range.from, fallback
        );
        Ok((fallback, probes))
    }

    /// Step back from `block` over every preceding block that still contains
    /// the `from` literal. Returns the earliest such block and the number of
    /// blocks stepped over.
    pub fn correct_to_first_block<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        extractor: &TimestampExtractor,
        block: BitPosition,
        from: &Stamp,
    ) -> Result<(BitPosition, usize)>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let mut current = block;
        let mut steps = 0;

        while !current.is_first_block() {
            let previous = self.previous_block(cursor, current)?;
            if !block_contains_literal(
                cursor,
                extractor,
                previous,
                &from.literal,
                previous.is_first_block(),
            )? {
                break;
            }
            debug!("Block {} also contains {}", previous, from);
            current = previous;
            steps += 1;
        }

        Ok((current, steps))
    }

    /// Block immediately before `block`, which must not be the first block
    fn previous_block<R, E>(
        &self,
        cursor: &mut DecodeCursor<R, E>,
        block: BitPosition,
    ) -> Result<BitPosition>
    where
        R: Read + Seek,
        E: DecodeEngine,
    {
        let floor = crate::config::STREAM_HEADER_LEN;
        let mut probe = block.byte_offset();

        // stride back until the scanner lands on an earlier block
        let mut earlier = loop {
            probe = probe.saturating_sub(self.correction_stride).max(floor);
            let found = cursor.locate_block(probe)?;
            if found < block {
                break found;
            }
            if probe == floor {
                return Err(RangeError::BoundaryNotFound { start: floor });
            }
        };

        // a stride can skip over several short blocks
        while let Some(next) = cursor.next_block(earlier)? {
            if next >= block {
                break;
            }
            earlier = next;
        }
        Ok(earlier)
    }
}

/// First and last datetimes visible in `block`
pub fn block_bounds<R, E>(
    cursor: &mut DecodeCursor<R, E>,
    extractor: &TimestampExtractor,
    block: BitPosition,
) -> Result<(Stamp, Stamp)>
where
    R: Read + Seek,
    E: DecodeEngine,
{
    let missing = RangeError::TimestampNotFound {
        position: block.bits(),
    };

    let head = cursor.decode_first_chunk(block)?;
    let Some(first) = extractor.first_stamp(&head, !block.is_first_block()) else {
        return Err(missing);
    };

    let tail = cursor.decode_last_two_chunks(block)?;
    let Some(last) = extractor.last_stamp(&tail.data, tail.whole_block && block.is_first_block())
    else {
        return Err(missing);
    };

    Ok((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{compress, concat_streams, log_lines, stamp, BASE_EPOCH};
    use crate::timestamp::ColumnPolicy;
    use std::io::Cursor;

    fn three_blocks() -> Vec<u8> {
        concat_streams(&[log_lines(0, 5, 3), log_lines(6, 12, 3), log_lines(13, 20, 3)])
    }

    fn setup(data: Vec<u8>, from: i64, to: i64) -> (DecodeCursor<Cursor<Vec<u8>>>, TimestampExtractor, TimeRange) {
        let cursor = DecodeCursor::open(Cursor::new(data), 256).unwrap();
        let range = TimeRange::parse(&stamp(from), &stamp(to)).unwrap();
        let extractor = TimestampExtractor::new(range.format, range.width(), ColumnPolicy::Detect);
        (cursor, extractor, range)
    }

    fn locator() -> RangeLocator {
        RangeLocator::new(&ExtractConfig {
            probe_step: 64,
            correction_stride: 64,
            ..ExtractConfig::default()
        })
    }

    #[test]
    fn test_validate_bounds() {
        let (mut cursor, mut extractor, range) = setup(three_blocks(), 7, 14);
        let bounds = locator().validate_bounds(&mut cursor, &mut extractor, &range).unwrap();
        assert_eq!(bounds.first.epoch, BASE_EPOCH);
        assert_eq!(bounds.last.epoch, BASE_EPOCH + 20);
        assert_eq!(extractor.column(), Some(0));

        let second = cursor.next_block(BitPosition::FIRST_BLOCK).unwrap().unwrap();
        let third = cursor.next_block(second).unwrap().unwrap();
        assert_eq!(bounds.last_block, third);
    }

    #[test]
    fn test_out_of_range() {
        let (mut cursor, mut extractor, range) = setup(three_blocks(), -1, 14);
        assert!(matches!(
            locator().validate_bounds(&mut cursor, &mut extractor, &range),
            Err(RangeError::OutOfRange { bound: "--from", .. })
        ));

        let (mut cursor, mut extractor, range) = setup(three_blocks(), 3, 21);
        assert!(matches!(
            locator().validate_bounds(&mut cursor, &mut extractor, &range),
            Err(RangeError::OutOfRange { bound: "--to", .. })
        ));
    }

    #[test]
    fn test_locate_middle_block() {
        let (mut cursor, mut extractor, range) = setup(three_blocks(), 7, 14);
        let location = locator().locate(&mut cursor, &mut extractor, &range).unwrap();

        let second = cursor.next_block(BitPosition::FIRST_BLOCK).unwrap().unwrap();
        assert_eq!(location.start_block, second);
        assert_eq!(location.corrected_blocks, 0);
    }

    #[test]
    fn test_from_equal_to_first_line() {
        let (mut cursor, mut extractor, range) = setup(three_blocks(), 0, 14);
        let location = locator().locate(&mut cursor, &mut extractor, &range).unwrap();

        assert!(location.search_block.is_first_block());
        assert!(location.start_block.is_first_block());
        assert_eq!(location.corrected_blocks, 0);
    }

    #[test]
    fn test_correction_walks_back_over_shared_second() {
        // 10:00:08 spans the boundary between blocks 2 and 3
        let data = concat_streams(&[
            log_lines(0, 5, 3),
            [log_lines(6, 7, 3), log_lines(8, 8, 2)].concat(),
            [log_lines(8, 8, 2), log_lines(9, 12, 3)].concat(),
            log_lines(13, 20, 3),
        ]);
        let (mut cursor, mut extractor, range) = setup(data, 8, 14);
        let loc = locator();
        let location = loc.locate(&mut cursor, &mut extractor, &range).unwrap();

        let second = cursor.next_block(BitPosition::FIRST_BLOCK).unwrap().unwrap();
        assert_eq!(location.start_block, second);

        // idempotent
        let (again, steps) = loc
            .correct_to_first_block(&mut cursor, &extractor, location.start_block, &range.from)
            .unwrap();
        assert_eq!(again, location.start_block);
        assert_eq!(steps, 0);
    }

    #[test]
    fn test_binary_search_brackets_target() {
        let text = log_lines(0, 20_000, 1);
        let data = compress(&text, 1);
        let loc = locator();

        for target in [1, 777, 5_000, 9_999, 12_345, 19_999] {
            let (mut cursor, mut extractor, range) = setup(data.clone(), target, 20_000);
            let bounds = loc.validate_bounds(&mut cursor, &mut extractor, &range).unwrap();
            let (block, probes) = loc
                .binary_search(&mut cursor, &extractor, &range, &bounds)
                .unwrap();
            assert!(probes < 64);

            let (first, last) = block_bounds(&mut cursor, &extractor, block).unwrap();
            let from = range.from.epoch;
            if first.epoch <= from && from <= last.epoch {
                continue;
            }
            // the line stamped `from` straddles a block boundary with its
            // datetime cut, so neither neighbour shows it
            assert!(from < first.epoch, "target {}", target);
            let previous = loc.previous_block(&mut cursor, block).unwrap();
            let (_, previous_last) = block_bounds(&mut cursor, &extractor, previous).unwrap();
            assert!(previous_last.epoch < from, "target {}", target);
        }
    }

    #[test]
    fn test_find_last_block_with_small_step() {
        let data = three_blocks();
        let (mut cursor, _, _) = setup(data, 1, 2);
        let last = RangeLocator::new(&ExtractConfig {
            probe_step: 1,
            ..ExtractConfig::default()
        })
        .find_last_block(&mut cursor)
        .unwrap();
        assert_eq!(cursor.next_block(last).unwrap(), None);
        assert!(!last.is_first_block());
    }
}
