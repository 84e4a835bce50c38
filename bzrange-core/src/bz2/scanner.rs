//! Block boundary scanner
//!
//! Finds the next 48-bit marker at any bit alignment by sliding a 64-bit
//! window over the byte stream.

use super::{BLOCK_MAGIC, EOS_MAGIC, MAGIC_BITS};
use crate::{RangeError, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Number of alignments tested per byte: the marker may end anywhere from the
/// last bit of the newest byte to the last bit of the byte before it
const ALIGNMENTS: usize = 9;

/// Precomputed needle for one bit alignment
#[derive(Debug, Clone, Copy)]
struct ShiftedNeedle {
    pattern: u64,
    mask: u64,
    shift: u64,
}

/// Scanner for bzip2 markers at arbitrary bit offsets
#[derive(Debug, Clone)]
pub struct BoundaryScanner {
    needles: Vec<ShiftedNeedle>,
    read_size: usize,
}

impl BoundaryScanner {
    /// Scanner for block starts only
    pub fn blocks() -> Self {
        Self::for_markers(&[BLOCK_MAGIC])
    }

    /// Scanner for anything that ends a block: the next block or end of stream
    pub fn block_ends() -> Self {
        Self::for_markers(&[BLOCK_MAGIC, EOS_MAGIC])
    }

    /// Scanner for an arbitrary set of 48-bit markers
    pub fn for_markers(markers: &[u64]) -> Self {
        let needles = markers
            .iter()
            .flat_map(|&marker| {
                (0..ALIGNMENTS as u64).map(move |shift| ShiftedNeedle {
                    pattern: marker << shift,
                    mask: ((1u64 << MAGIC_BITS) - 1) << shift,
                    shift,
                })
            })
            .collect();

        Self {
            needles,
            read_size: crate::config::CHUNK_SIZE,
        }
    }

    /// Use `read_size`-byte reads
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    /// Bit offset, relative to the reader's current byte, of the next marker
    /// starting at or after it.
    ///
    /// The reader is positioned back at its starting byte on success.
    /// Running off the end of input is `BoundaryNotFound`.
    pub fn find_next<R: Read + Seek>(&self, reader: &mut R) -> Result<u64> {
        let start = reader.stream_position()?;
        let found = self.scan(reader)?;
        reader.seek(SeekFrom::Start(start))?;

        found.ok_or(RangeError::BoundaryNotFound { start })
    }

    fn scan<R: Read>(&self, reader: &mut R) -> Result<Option<u64>> {
        let mut buf = vec![0u8; self.read_size];
        let mut hay = 0u64;
        let mut consumed = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            for &byte in &buf[..n] {
                hay = (hay << 8) | byte as u64;
                consumed += 1;
                if consumed < MAGIC_BITS / 8 {
                    continue;
                }

                if let Some(offset) = self.match_window(hay, consumed) {
                    return Ok(Some(offset));
                }
            }
        }
    }

    /// Test every alignment against the window holding the last `consumed`
    /// bytes (at most 8 of them). A needle shifted by `i` bits ends `i` bits
    /// before the end of the newest byte: inside the newest byte for `i == 0`,
    /// one byte back for `i == 8`.
    #[inline]
    fn match_window(&self, hay: u64, consumed: u64) -> Option<u64> {
        let end_of_window = consumed * 8;
        self.needles
            .iter()
            .filter(|needle| hay & needle.mask == needle.pattern)
            // a match whose leading bits come from before the scan origin is
            // an artifact of the zero-initialised window
            .find(|needle| end_of_window >= MAGIC_BITS + needle.shift)
            .map(|needle| end_of_window - needle.shift - MAGIC_BITS)
    }
}
