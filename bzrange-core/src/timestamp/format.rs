//! Recognised log datetime formats

use crate::{RangeError, Result, Timestamp};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Year assumed for formats that carry none. A leap year, so `Feb 29` parses.
const YEARLESS_BASE: i32 = 2000;

/// Datetime layouts found at the start of log lines, tried in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateFormat {
    /// `2017-02-21T14:53:22` (sip.log)
    IsoT,
    /// `Oct 30 05:54:01` (syslog)
    Syslog,
    /// `2017-02-21 14:53:22`
    IsoSpace,
    /// `21/Feb/2017:14:53:22` (common log format)
    Clf,
}

impl DateFormat {
    /// All formats, in matching order
    pub const ALL: [DateFormat; 4] = [
        DateFormat::IsoT,
        DateFormat::Syslog,
        DateFormat::IsoSpace,
        DateFormat::Clf,
    ];

    /// strftime-style pattern
    pub fn pattern(&self) -> &'static str {
        match self {
            DateFormat::IsoT => "%Y-%m-%dT%H:%M:%S",
            DateFormat::Syslog => "%b %d %H:%M:%S",
            DateFormat::IsoSpace => "%Y-%m-%d %H:%M:%S",
            DateFormat::Clf => "%d/%b/%Y:%H:%M:%S",
        }
    }

    /// Find the first format `s` parses under; first match wins
    pub fn recognize(s: &str) -> Result<(Self, Timestamp)> {
        Self::ALL
            .iter()
            .find_map(|format| format.parse(s).map(|ts| (*format, ts)))
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|f| f.pattern()).collect();
                RangeError::Format(format!(
                    "{:?} is not in a supported datetime format; supported formats are: {}",
                    s,
                    supported.join(", ")
                ))
            })
    }

    /// Parse a whole string, returning seconds since the epoch (UTC)
    pub fn parse(&self, s: &str) -> Option<Timestamp> {
        // chrono skips whitespace before numeric fields, which would let a
        // window shifted one byte left match with a truncated seconds field
        if s.starts_with(char::is_whitespace) {
            return None;
        }
        let parsed = match self {
            DateFormat::Syslog => NaiveDateTime::parse_from_str(
                &format!("{} {}", YEARLESS_BASE, s),
                "%Y %b %d %H:%M:%S",
            ),
            _ => NaiveDateTime::parse_from_str(s, self.pattern()),
        };
        parsed.ok().map(|dt| dt.and_utc().timestamp())
    }

    /// Parse a raw byte window; non-UTF-8 input never matches
    pub fn parse_bytes(&self, bytes: &[u8]) -> Option<Timestamp> {
        std::str::from_utf8(bytes).ok().and_then(|s| self.parse(s))
    }
}
