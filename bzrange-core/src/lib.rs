//! bzrange Core - Time-Range Extraction from bzip2 Logs
//!
//! Pulls the lines between two datetimes out of a bzip2-compressed log
//! without decompressing the whole file. bzip2 blocks decode independently,
//! so the file can be binary searched by byte offset, decoding one block per
//! probe.
//!
//! # Architecture
//!
//! - **bz2**: bit I/O, the block boundary scanner and the decode engine
//! - **cursor**: seeks to a block's bit position and decodes it in chunks
//! - **timestamp**: datetime formats, per-block first/last datetimes and
//!   literal search
//! - **range**: the locator (bounds check, binary search, backward
//!   correction) and the emitter

pub mod bz2;
pub mod cursor;
pub mod range;
pub mod timestamp;

mod error;
mod types;

#[cfg(test)]
mod testutil;

pub use error::{RangeError, Result};
pub use types::*;

/// Default configuration values
pub mod config {
    /// Decoded chunk size and scanner read size (8KB)
    pub const CHUNK_SIZE: usize = 8 * 1024;

    /// Bit offset of the first block: right after the `BZhN` header
    pub const FIRST_BLOCK_BIT: u64 = 32;

    /// Backward step when probing for the last block
    pub const LAST_BLOCK_PROBE_STEP: u64 = 512;

    /// Length of a bzip2 stream header
    pub const STREAM_HEADER_LEN: u64 = 4;
}
