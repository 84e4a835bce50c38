//! Error types for bzrange

use thiserror::Error;

/// Result type alias for bzrange operations
pub type Result<T> = std::result::Result<T, RangeError>;

/// bzrange error types
#[derive(Error, Debug)]
pub enum RangeError {
    /// Bad or missing options
    #[error("Usage error: {0}")]
    Usage(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The decode engine rejected a block
    #[error("Decode error in block at bit {position}: {reason}")]
    Decode { position: u64, reason: String },

    /// The scanner ran off the end of the file without seeing a block marker
    #[error("No block marker found after byte {start}")]
    BoundaryNotFound { start: u64 },

    /// Datetime string matches no recognised pattern, or from/to disagree
    #[error("Datetime format error: {0}")]
    Format(String),

    /// from/to fall outside the interval covered by the file
    #[error("{bound} ({value}) lies outside the file's coverage, {limit}")]
    OutOfRange {
        bound: &'static str,
        value: String,
        limit: String,
    },

    /// from is not strictly earlier than to
    #[error("--from ({from}) must be earlier than --to ({to})")]
    Order { from: String, to: String },

    /// Seek consistency check failed
    #[error("Seek mismatch: expected byte {expected}, got {actual}")]
    SeekMismatch { expected: u64, actual: u64 },

    /// Input is not a bzip2 stream
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A probed block carries no parseable timestamp at the date column
    #[error("No timestamp found in block at bit {position}")]
    TimestampNotFound { position: u64 },
}

impl RangeError {
    /// Check if error indicates a damaged or truncated input file
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RangeError::Decode { .. }
                | RangeError::BoundaryNotFound { .. }
                | RangeError::InvalidFormat(_)
        )
    }

    /// Check if error was caused by the query arguments rather than the file
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RangeError::Usage(_)
                | RangeError::Format(_)
                | RangeError::OutOfRange { .. }
                | RangeError::Order { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_user_error() {
            2
        } else {
            1
        }
    }
}
