//! Timestamp extraction from decoded block text

use super::DateFormat;
use crate::Stamp;

/// Where the datetime sits inside each log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnPolicy {
    /// Find the column in the file's first line that carries a datetime and
    /// assume every later line uses the same column
    #[default]
    Detect,
    /// Datetime always starts this many bytes after the line start
    Fixed(usize),
}

/// Finds first/last datetimes in decoded buffers using a fixed window width
#[derive(Debug, Clone)]
pub struct TimestampExtractor {
    format: DateFormat,
    width: usize,
    column: Option<usize>,
}

impl TimestampExtractor {
    /// Create an extractor for `width`-byte literals in `format`
    pub fn new(format: DateFormat, width: usize, policy: ColumnPolicy) -> Self {
        let column = match policy {
            ColumnPolicy::Detect => None,
            ColumnPolicy::Fixed(column) => Some(column),
        };
        Self {
            format,
            width,
            column,
        }
    }

    /// Byte offset of the datetime within a line, once known
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Find the first datetime in `buf` at any column and remember that column.
    ///
    /// `buf` must start at a line boundary (the file's first block). With a
    /// fixed column this is the same as [`first_stamp`](Self::first_stamp).
    pub fn locate_column(&mut self, buf: &[u8]) -> Option<Stamp> {
        if self.column.is_some() {
            return self.first_stamp(buf, false);
        }

        for line in buf.split(|&b| b == b'\n') {
            if line.len() < self.width {
                continue;
            }
            for column in 0..=line.len() - self.width {
                if let Some(stamp) = self.parse_window(&line[column..column + self.width]) {
                    self.column = Some(column);
                    return Some(stamp);
                }
            }
        }
        None
    }

    /// First line in `buf` whose window at the known column parses.
    ///
    /// With `skip_partial` the text before the first newline is ignored: a
    /// block boundary can split a line anywhere.
    pub fn first_stamp(&self, buf: &[u8], skip_partial: bool) -> Option<Stamp> {
        let skip = usize::from(skip_partial);
        buf.split(|&b| b == b'\n')
            .skip(skip)
            .find_map(|line| self.stamp_at_column(line))
    }

    /// Last line in `buf` whose window at the known column parses.
    ///
    /// Line starts are walked backwards from the end; the trailing line may be
    /// cut short, which is fine as long as its datetime is complete. The text
    /// before the first newline is only considered when `leading_complete`.
    pub fn last_stamp(&self, buf: &[u8], leading_complete: bool) -> Option<Stamp> {
        let mut end = buf.len();
        while let Some(nl) = buf[..end].iter().rposition(|&b| b == b'\n') {
            if let Some(stamp) = self.stamp_at_column(&buf[nl + 1..end]) {
                return Some(stamp);
            }
            end = nl;
        }
        if leading_complete {
            self.stamp_at_column(&buf[..end])
        } else {
            None
        }
    }

    /// Streaming matcher for `literal` at this extractor's column
    pub fn literal_matcher<'a>(&self, literal: &'a [u8], at_line_start: bool) -> LiteralMatcher<'a> {
        LiteralMatcher::new(literal, self.column.unwrap_or(0), at_line_start)
    }

    fn stamp_at_column(&self, line: &[u8]) -> Option<Stamp> {
        let column = self.column.unwrap_or(0);
        let end = column.checked_add(self.width)?;
        let window = line.get(column..end)?;
        self.parse_window(window)
    }

    fn parse_window(&self, window: &[u8]) -> Option<Stamp> {
        let epoch = self.format.parse_bytes(window)?;
        // parse_bytes already rejected non-UTF-8
        let literal = String::from_utf8_lossy(window).into_owned();
        Some(Stamp::new(literal, epoch))
    }
}

/// Chunk-boundary safe search for an exact literal at a fixed column after a
/// line start.
///
/// Bytes of a line that began before the first fed chunk are ignored unless
/// the matcher was created `at_line_start`.
#[derive(Debug)]
pub struct LiteralMatcher<'a> {
    literal: &'a [u8],
    column: usize,
    /// Bytes seen since the current line started; `None` once the line can no
    /// longer match
    line_offset: Option<usize>,
    found: bool,
}

impl<'a> LiteralMatcher<'a> {
    /// Create a matcher
    pub fn new(literal: &'a [u8], column: usize, at_line_start: bool) -> Self {
        Self {
            literal,
            column,
            line_offset: at_line_start.then_some(0),
            found: literal.is_empty(),
        }
    }

    /// Feed the next chunk; returns true once the literal has been seen
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.found {
            return true;
        }

        for &b in chunk {
            if b == b'\n' {
                self.line_offset = Some(0);
                continue;
            }
            let Some(offset) = self.line_offset else {
                continue;
            };
            if offset >= self.column {
                let i = offset - self.column;
                if self.literal[i] != b {
                    self.line_offset = None;
                    continue;
                }
                if i + 1 == self.literal.len() {
                    self.found = true;
                    return true;
                }
            }
            self.line_offset = Some(offset + 1);
        }
        false
    }

    /// Whether the literal has been seen
    pub fn found(&self) -> bool {
        self.found
    }
}
