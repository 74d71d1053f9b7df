//! # Tessera World
//!
//! Client-side map grid cache.
//!
//! This crate handles:
//! - Reassembly of fragmented map payloads
//! - Decoding of compressed grid updates
//! - Grid storage with request-on-miss and bounded retries
//! - Tile-set resolution and decorative object placement
//! - Client-side overlay regions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod flavor;
pub mod fragment;
pub mod grid;
pub mod message;
pub mod overlay;
pub mod request;
pub mod resource;
pub mod tileset;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheStats, GridState, MapCache, MapUpdate};
    pub use crate::config::MapConfig;
    pub use crate::decode::DecodeError;
    pub use crate::error::{MapError, MapResult};
    pub use crate::flavor::FlavorObject;
    pub use crate::fragment::{FragmentError, FragmentReassembler};
    pub use crate::grid::Grid;
    pub use crate::message::{InvalidateMessage, MapData, MapFragment, TilesetMapping};
    pub use crate::overlay::{OverlayHandle, OverlayRegion, OverlaySet};
    pub use crate::request::{GridRequest, PendingRequest};
    pub use crate::resource::{ResourceLoader, StaticResource, TileResource};
    pub use crate::tileset::{FlavorChoice, Tileset, TilesetError, TilesetRegistry};
}

pub use prelude::*;
