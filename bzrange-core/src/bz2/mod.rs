//! bzip2 container plumbing
//!
//! A bzip2 file is one or more streams, each laid out as:
//!
//! - 4-byte header `BZh1`..`BZh9`
//! - blocks, each introduced by the 48-bit magic `0x314159265359` followed by
//!   a 32-bit block CRC, at arbitrary bit alignment
//! - the 48-bit end-of-stream magic `0x177245385090`, a 32-bit combined CRC
//!   and zero padding to the next byte
//!
//! Blocks are independent, so any one of them can be cut out, re-framed as a
//! single-block stream and handed to an ordinary decompressor.

mod bitstream;
mod engine;
mod scanner;

pub use bitstream::{BitReader, BitWriter};
pub use engine::{Bzip2Engine, DecodeEngine};
pub use scanner::BoundaryScanner;

use crate::{RangeError, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Block start marker (BCD pi)
pub const BLOCK_MAGIC: u64 = 0x3141_5926_5359;

/// End-of-stream marker (BCD sqrt(pi))
pub const EOS_MAGIC: u64 = 0x1772_4538_5090;

/// Width of both markers
pub const MAGIC_BITS: u64 = 48;

/// Width of the CRC following each marker
pub const CRC_BITS: u64 = 32;

/// bzip2 stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Block size level, 1..=9 (x 100k)
    pub level: u8,
}

impl StreamHeader {
    /// Header size in bytes
    pub const SIZE: usize = crate::config::STREAM_HEADER_LEN as usize;

    /// Read and validate the header at the start of `reader`
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; Self::SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(RangeError::InvalidFormat(
                    "file is too short to be a bzip2 stream".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        Self::from_bytes(&header)
    }

    /// Validate a header
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match data {
            [b'B', b'Z', b'h', level @ b'1'..=b'9', ..] => Ok(Self {
                level: level - b'0',
            }),
            _ => Err(RangeError::InvalidFormat(
                "missing bzip2 stream header (BZh1..BZh9)".into(),
            )),
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; 4] {
        [b'B', b'Z', b'h', b'0' + self.level]
    }
}
