//! Fixtures shared by unit tests

use crate::Timestamp;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use chrono::DateTime;
use std::io::Write;

/// 2017-02-21 10:00:00 UTC
pub const BASE_EPOCH: Timestamp = 1_487_671_200;

/// Compress `data` as one bzip2 stream
pub fn compress(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One single-block stream per part, concatenated: block boundaries fall
/// exactly between parts
pub fn concat_streams(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.iter().flat_map(|part| compress(part, 9)).collect()
}

/// `2017-02-21 HH:MM:SS` for `BASE_EPOCH + offset`
pub fn stamp(offset: i64) -> String {
    DateTime::from_timestamp(BASE_EPOCH + offset, 0)
        .unwrap()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// `per_second` log lines for every second from `first` to `last` inclusive
pub fn log_lines(first: i64, last: i64, per_second: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for offset in first..=last {
        for n in 0..per_second {
            writeln!(out, "{} web01 GET /api/items/{} 200", stamp(offset), n).unwrap();
        }
    }
    out
}
