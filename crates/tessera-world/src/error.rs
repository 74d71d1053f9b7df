//! Errors from handling map messages.

use tessera_common::{Coord, WireError};
use thiserror::Error;

use crate::decode::DecodeError;
use crate::fragment::FragmentError;

/// A map message that had to be dropped.
///
/// None of these leave the cache in a different state than before the
/// message arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// Message body could not be parsed
    #[error("malformed map message: {0}")]
    Wire(#[from] WireError),

    /// Fragment did not fit its payload
    #[error("bad map fragment: {0}")]
    Fragment(#[from] FragmentError),

    /// Grid update could not be decoded
    #[error("bad grid update: {0}")]
    Decode(#[from] DecodeError),

    /// Grid size does not match the cache's grid extent
    #[error("grid {gc} has extent {actual}, cache expects {expected}")]
    ExtentMismatch {
        /// Grid coordinate
        gc: Coord,
        /// Cache grid extent
        expected: Coord,
        /// Extent of the offered grid
        actual: Coord,
    },

    /// Grid has tiles without a world position at the cache's tile size
    #[error("grid {gc} lies outside the addressable world")]
    OutOfRange {
        /// Grid coordinate
        gc: Coord,
    },
}

/// Result type alias for message handling.
pub type MapResult<T> = Result<T, MapError>;
