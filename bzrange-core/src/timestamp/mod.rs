//! Datetime recognition and per-block timestamp extraction

mod extractor;
mod format;

pub use extractor::{ColumnPolicy, LiteralMatcher, TimestampExtractor};
pub use format::DateFormat;
