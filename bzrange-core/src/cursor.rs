//! Decode cursor
//!
//! Owns the reader and one decode engine. Positions are absolute
//! [`BitPosition`]s; internally the cursor keeps an origin byte and talks to
//! the engine in bit offsets relative to it.

use crate::bz2::{BoundaryScanner, Bzip2Engine, DecodeEngine, StreamHeader};
use crate::{BitPosition, RangeError, Result};
use bytes::{Bytes, BytesMut};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use tracing::debug;

/// Tail of a decoded block
#[derive(Debug, Clone)]
pub struct TailChunks {
    /// The last one or two chunks of decoded output, in order
    pub data: Bytes,
    /// `data` starts at the first decoded byte of the block
    pub whole_block: bool,
}

/// Seekable, chunked view of the blocks of one bzip2 file
pub struct DecodeCursor<R, E = Bzip2Engine> {
    reader: R,
    engine: E,
    scanner: BoundaryScanner,
    origin: u64,
    file_size: u64,
    chunk_size: usize,
}

impl<R: Read + Seek> DecodeCursor<R> {
    /// Open a cursor over `reader` with the libbz2 engine
    pub fn open(reader: R, chunk_size: usize) -> Result<Self> {
        Self::with_engine(reader, Bzip2Engine::new(), chunk_size)
    }
}

impl<R: Read + Seek, E: DecodeEngine> DecodeCursor<R, E> {
    /// Open a cursor with a specific engine. The stream header is validated.
    pub fn with_engine(mut reader: R, engine: E, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RangeError::Usage("chunk size must be positive".into()));
        }

        let header = StreamHeader::read(&mut reader)?;
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        debug!(
            "Opened bzip2 file: {} bytes, block size level {}",
            file_size, header.level
        );

        Ok(Self {
            reader,
            engine,
            scanner: BoundaryScanner::blocks().with_read_size(chunk_size),
            origin: 0,
            file_size,
            chunk_size,
        })
    }

    /// Compressed file size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Move the origin to `byte` and position the reader there
    pub fn set_origin(&mut self, byte: u64) -> Result<()> {
        self.seek_checked(byte)?;
        self.origin = byte;
        Ok(())
    }

    /// First block starting at or after `byte`, or `None` when the file has
    /// no further block
    pub fn try_locate_block(&mut self, byte: u64) -> Result<Option<BitPosition>> {
        if byte >= self.file_size {
            return Ok(None);
        }

        self.set_origin(byte)?;
        match self.scanner.find_next(&mut self.reader) {
            Ok(rel) => Ok(Some(BitPosition::from_relative(byte, rel))),
            Err(RangeError::BoundaryNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First block starting at or after `byte`
    pub fn locate_block(&mut self, byte: u64) -> Result<BitPosition> {
        self.try_locate_block(byte)?
            .ok_or(RangeError::BoundaryNotFound { start: byte })
    }

    /// Block following the one at `pos`
    pub fn next_block(&mut self, pos: BitPosition) -> Result<Option<BitPosition>> {
        // blocks are far longer than a byte, so the next marker cannot start
        // in the same byte as this one
        self.try_locate_block(pos.byte_offset() + 1)
    }

    /// Position the reader `rel` bits after the origin and reset the engine
    pub fn seek_to_bit(&mut self, rel: u64) -> Result<()> {
        self.seek_checked(self.origin + rel / 8)?;
        self.engine.reset();
        self.engine.prime_bits((rel % 8) as u8);
        Ok(())
    }

    /// Decode the header of the block at the current position
    pub fn begin_block(&mut self) -> Result<()> {
        self.engine.begin_block(&mut self.reader)
    }

    /// Next decoded bytes of the open block; 0 at its end
    pub fn decode_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.engine.decode_chunk(buf)
    }

    /// Decode the first chunk of the block at `pos`
    pub fn decode_first_chunk(&mut self, pos: BitPosition) -> Result<Bytes> {
        self.open_block(pos)?;

        let mut buf = BytesMut::zeroed(self.chunk_size);
        let n = self.decode_chunk(&mut buf)?;
        if n == 0 {
            return Err(RangeError::Decode {
                position: pos.bits(),
                reason: "block decoded to no data".into(),
            });
        }
        buf.truncate(n);
        Ok(buf.freeze())
    }

    /// Decode the block at `pos` to its end, keeping the last two chunks.
    ///
    /// When the output is an exact multiple of the chunk size the last two
    /// full chunks are returned.
    pub fn decode_last_two_chunks(&mut self, pos: BitPosition) -> Result<TailChunks> {
        self.open_block(pos)?;

        let mut older = vec![0u8; self.chunk_size];
        let mut older_len = 0;
        let mut latest = vec![0u8; self.chunk_size];
        let mut latest_len = 0;
        let mut full_chunks = 0u64;

        loop {
            // `older` is only needed again if this read returns nothing
            let n = self.decode_chunk(&mut older)?;
            if n == self.chunk_size {
                std::mem::swap(&mut older, &mut latest);
                older_len = latest_len;
                latest_len = n;
                full_chunks += 1;
                continue;
            }

            let mut data = BytesMut::with_capacity(2 * self.chunk_size);
            let whole_block = if n == 0 {
                data.extend_from_slice(&older[..older_len]);
                data.extend_from_slice(&latest[..latest_len]);
                full_chunks <= 2
            } else {
                data.extend_from_slice(&latest[..latest_len]);
                data.extend_from_slice(&older[..n]);
                full_chunks <= 1
            };

            if data.is_empty() {
                return Err(RangeError::Decode {
                    position: pos.bits(),
                    reason: "block decoded to no data".into(),
                });
            }
            return Ok(TailChunks {
                data: data.freeze(),
                whole_block,
            });
        }
    }

    /// Decode the block at `pos` chunk by chunk, handing each to `f` until it
    /// breaks. Returns whether `f` broke early.
    pub fn scan_block<F>(&mut self, pos: BitPosition, mut f: F) -> Result<bool>
    where
        F: FnMut(&[u8]) -> Result<ControlFlow<()>>,
    {
        self.open_block(pos)?;

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = self.decode_chunk(&mut buf)?;
            if n == 0 {
                return Ok(false);
            }
            if f(&buf[..n])?.is_break() {
                return Ok(true);
            }
        }
    }

    /// Decode the whole block at `pos` into `sink`; returns the byte count
    pub fn decode_block_to_sink<W: Write>(&mut self, pos: BitPosition, sink: &mut W) -> Result<u64> {
        let mut written = 0u64;
        self.scan_block(pos, |chunk| {
            sink.write_all(chunk)?;
            written += chunk.len() as u64;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(written)
    }

    fn open_block(&mut self, pos: BitPosition) -> Result<()> {
        let rel = match pos.relative_to(self.origin) {
            Some(rel) => rel,
            None => {
                self.set_origin(pos.byte_offset())?;
                pos.bit_in_byte() as u64
            }
        };
        self.seek_to_bit(rel)?;
        self.begin_block()
    }

    fn seek_checked(&mut self, expected: u64) -> Result<()> {
        let actual = self.reader.seek(SeekFrom::Start(expected))?;
        if actual != expected {
            return Err(RangeError::SeekMismatch { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{compress, concat_streams, log_lines};
    use std::io::Cursor;

    fn block_texts() -> Vec<Vec<u8>> {
        vec![
            log_lines(0, 5, 3),
            log_lines(6, 12, 3),
            log_lines(13, 20, 3),
        ]
    }

    fn all_blocks<R: Read + Seek>(cursor: &mut DecodeCursor<R>) -> Vec<BitPosition> {
        let mut blocks = vec![cursor.locate_block(0).unwrap()];
        while let Some(next) = cursor.next_block(*blocks.last().unwrap()).unwrap() {
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn test_open_rejects_non_bzip2() {
        assert!(matches!(
            DecodeCursor::open(Cursor::new(b"PK\x03\x04 not bzip2".to_vec()), 64),
            Err(RangeError::InvalidFormat(_))
        ));
        assert!(matches!(
            DecodeCursor::open(Cursor::new(compress(b"x\n", 9)), 0),
            Err(RangeError::Usage(_))
        ));
    }

    #[test]
    fn test_walk_and_decode_every_block() {
        let texts = block_texts();
        let mut cursor = DecodeCursor::open(Cursor::new(concat_streams(&texts)), 128).unwrap();

        let blocks = all_blocks(&mut cursor);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].is_first_block());

        // decode out of order to exercise re-origining
        for i in [2usize, 0, 1] {
            let mut out = Vec::new();
            let n = cursor.decode_block_to_sink(blocks[i], &mut out).unwrap();
            assert_eq!(n as usize, texts[i].len());
            assert_eq!(out, texts[i]);
        }
    }

    #[test]
    fn test_multi_block_stream_round_trip() {
        let text = log_lines(0, 20_000, 1);
        let mut cursor = DecodeCursor::open(Cursor::new(compress(&text, 1)), 8192).unwrap();

        let blocks = all_blocks(&mut cursor);
        assert!(blocks.len() >= 3, "only {} blocks", blocks.len());
        assert!(blocks.iter().any(|b| b.bit_in_byte() != 0));

        let mut out = Vec::new();
        for block in blocks {
            cursor.decode_block_to_sink(block, &mut out).unwrap();
        }
        assert_eq!(out, text);
    }

    #[test]
    fn test_first_chunk_and_tail() {
        let texts = block_texts();
        let mut cursor = DecodeCursor::open(Cursor::new(concat_streams(&texts)), 64).unwrap();
        let blocks = all_blocks(&mut cursor);

        let head = cursor.decode_first_chunk(blocks[1]).unwrap();
        assert_eq!(&head[..], &texts[1][..64]);

        let tail = cursor.decode_last_two_chunks(blocks[1]).unwrap();
        assert!(!tail.whole_block);
        assert!(tail.data.len() > 64 && tail.data.len() < 128);
        assert!(texts[1].ends_with(&tail.data));
    }

    #[test]
    fn test_tail_of_exact_multiple() {
        let text = vec![b'a'; 96];
        let mut cursor = DecodeCursor::open(Cursor::new(compress(&text, 9)), 32).unwrap();

        let tail = cursor.decode_last_two_chunks(BitPosition::FIRST_BLOCK).unwrap();
        assert_eq!(tail.data.len(), 64);
        assert!(!tail.whole_block);

        let mut cursor = DecodeCursor::open(Cursor::new(compress(&text, 9)), 48).unwrap();
        let tail = cursor.decode_last_two_chunks(BitPosition::FIRST_BLOCK).unwrap();
        assert_eq!(tail.data.len(), 96);
        assert!(tail.whole_block);
    }

    #[test]
    fn test_scan_block_stops_early() {
        let text = log_lines(0, 100, 1);
        let mut cursor = DecodeCursor::open(Cursor::new(compress(&text, 9)), 16).unwrap();

        let mut seen = 0;
        let stopped = cursor
            .scan_block(BitPosition::FIRST_BLOCK, |chunk| {
                seen += chunk.len();
                Ok(if seen >= 48 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();
        assert!(stopped);
        assert_eq!(seen, 48);
    }

    #[test]
    fn test_locate_past_last_block() {
        let data = concat_streams(&block_texts());
        let size = data.len() as u64;
        let mut cursor = DecodeCursor::open(Cursor::new(data), 64).unwrap();

        assert_eq!(cursor.try_locate_block(size).unwrap(), None);
        assert_eq!(cursor.try_locate_block(size - 4).unwrap(), None);
        assert!(matches!(
            cursor.locate_block(size - 4),
            Err(RangeError::BoundaryNotFound { .. })
        ));
    }

    /// Reader whose absolute seeks report one byte past where they landed
    struct SkewedSeek(Cursor<Vec<u8>>);

    impl Read for SkewedSeek {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for SkewedSeek {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            let landed = self.0.seek(pos)?;
            match pos {
                SeekFrom::Start(n) if n > 0 => Ok(landed + 1),
                _ => Ok(landed),
            }
        }
    }

    #[test]
    fn test_seek_mismatch() {
        let data = concat_streams(&block_texts());
        let mut cursor = DecodeCursor::open(SkewedSeek(Cursor::new(data)), 64).unwrap();

        let err = cursor.try_locate_block(5).unwrap_err();
        assert!(matches!(
            err,
            RangeError::SeekMismatch { expected: 5, actual: 6 }
        ));
        assert_eq!(err.exit_code(), 1);
    }
}
