//! Error types shared across Tessera crates.

use thiserror::Error;

/// Data for a grid or tile-set has not arrived yet.
///
/// This is an expected, frequent condition rather than a failure: whoever
/// raises it has already made sure the missing data will be requested, and
/// the caller should simply try again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("map data not ready")]
pub struct NotReady;

/// Result of a read that may hit data which has not arrived yet.
pub type Ready<T> = Result<T, NotReady>;

/// Errors from reading a session message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Message ended before a field could be read
    #[error("message truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Read position
        offset: usize,
        /// Bytes the field needed
        needed: usize,
        /// Bytes left in the message
        available: usize,
    },

    /// A string field had no NUL terminator
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    /// A string field was not valid UTF-8
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidString(usize),
}

/// Result type alias for wire reads.
pub type WireResult<T> = Result<T, WireError>;
