//! Block decode engine
//!
//! [`Bzip2Engine`] does the work `bzip2recover` does: it cuts one block out of
//! the file at its bit offset, wraps it in a fresh single-block stream and
//! decompresses that with libbz2.

use super::{BitReader, BitWriter, BoundaryScanner, StreamHeader};
use super::{BLOCK_MAGIC, CRC_BITS, EOS_MAGIC, MAGIC_BITS};
use crate::{RangeError, Result};
use bzip2::read::BzDecoder;
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

/// Decompressor for one block at a time, driven by a cursor
pub trait DecodeEngine {
    /// Drop any open block and alignment state
    fn reset(&mut self);

    /// Consume `bits` (0..=7) leading bits of the byte at the reader position,
    /// so the next block starts bit-aligned
    fn prime_bits(&mut self, bits: u8);

    /// Decode the header of the block starting at the reader position
    fn begin_block<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()>;

    /// Fill `buf` with decoded bytes; fewer at the end of the block, 0 once the
    /// block is exhausted
    fn decode_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// libbz2-backed engine
pub struct Bzip2Engine {
    end_scanner: BoundaryScanner,
    primed: u8,
    block_start: u64,
    decoder: Option<BzDecoder<Cursor<Vec<u8>>>>,
}

impl Bzip2Engine {
    /// Create a new engine
    pub fn new() -> Self {
        Self {
            end_scanner: BoundaryScanner::block_ends(),
            primed: 0,
            block_start: 0,
            decoder: None,
        }
    }

    fn decode_error(&self, reason: impl Into<String>) -> RangeError {
        RangeError::Decode {
            position: self.block_start,
            reason: reason.into(),
        }
    }
}

impl Default for Bzip2Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeEngine for Bzip2Engine {
    fn reset(&mut self) {
        self.primed = 0;
        self.block_start = 0;
        self.decoder = None;
    }

    fn prime_bits(&mut self, bits: u8) {
        debug_assert!(bits < 8);
        self.primed = bits;
    }

    fn begin_block<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()> {
        let start_byte = reader.stream_position()?;
        self.block_start = start_byte * 8 + self.primed as u64;
        self.decoder = None;

        // The block runs until the next block or end-of-stream marker. Scanning
        // from the following byte cannot report the marker of this block.
        reader.seek(SeekFrom::Start(start_byte + 1))?;
        let end_bit = match self.end_scanner.find_next(reader) {
            Ok(rel) => (start_byte + 1) * 8 + rel,
            Err(RangeError::BoundaryNotFound { .. }) => {
                return Err(self.decode_error("block is not terminated by a marker"));
            }
            Err(e) => return Err(e),
        };

        let block_bits = end_bit - self.block_start;
        if block_bits <= MAGIC_BITS + CRC_BITS {
            return Err(self.decode_error(format!("block is only {} bits long", block_bits)));
        }

        let end_byte = (end_bit + 7) / 8;
        let mut raw = vec![0u8; (end_byte - start_byte) as usize];
        reader.seek(SeekFrom::Start(start_byte))?;
        reader.read_exact(&mut raw)?;

        let stream = frame_block(&raw, self.primed, block_bits)
            .map_err(|reason| self.decode_error(reason))?;
        self.decoder = Some(BzDecoder::new(Cursor::new(stream)));
        Ok(())
    }

    fn decode_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let position = self.block_start;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| RangeError::Decode {
                position,
                reason: "no block is open".into(),
            })?;

        let mut filled = 0;
        while filled < buf.len() {
            match decoder.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(RangeError::Decode {
                        position,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(filled)
    }
}

/// Wrap `block_bits` bits of `raw`, starting `skip` bits in, as a complete
/// single-block bzip2 stream.
///
/// The combined CRC of a one-block stream equals that block's CRC, so the
/// trailer reuses the CRC stored in the block header.
fn frame_block(raw: &[u8], skip: u8, block_bits: u64) -> std::result::Result<Vec<u8>, String> {
    let mut reader = BitReader::new(raw);
    if !reader.skip_bits(skip as u64) {
        return Err("block lies past the end of input".into());
    }

    let magic = reader.read_bits(MAGIC_BITS as usize);
    if magic != Some(BLOCK_MAGIC) {
        return Err(format!("no block marker at this position (found {:x?})", magic));
    }
    let crc = reader
        .read_bits(CRC_BITS as usize)
        .ok_or_else(|| "block header is truncated".to_string())?;

    let header = StreamHeader { level: 9 };
    let mut writer = BitWriter::with_capacity(raw.len() + 16);
    writer.write_bytes(&header.to_bytes());
    writer.write_bits(BLOCK_MAGIC, MAGIC_BITS as usize);
    writer.write_bits(crc, CRC_BITS as usize);
    if !writer.copy_from(&mut reader, block_bits - MAGIC_BITS - CRC_BITS) {
        return Err("block body is truncated".into());
    }
    writer.write_bits(EOS_MAGIC, MAGIC_BITS as usize);
    writer.write_bits(crc, CRC_BITS as usize);

    Ok(writer.finish())
}
