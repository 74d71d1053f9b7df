//! # Tessera Common
//!
//! Common types and wire helpers for the Tessera map cache.
//!
//! This crate provides the vocabulary shared by the cache and its session:
//! - Coordinate type used in both grid and tile space
//! - ID types (grid identity seed, packet ids, tile-set ids)
//! - The `NotReady` signal and wire-level errors
//! - Little-endian message reader and writer
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod wire;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::wire::*;
}

pub use prelude::*;
