//! ID types for grids, packets and tile-sets.

use serde::{Deserialize, Serialize};

use crate::coords::Coord;

/// Stable 64-bit identity of a grid, derived only from its coordinate.
///
/// Used as the seed for everything that must be reproducible per grid, such
/// as decorative object placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridId(u64);

impl GridId {
    /// Derives the identity of the grid at `gc`.
    ///
    /// X fills the high 32 bits; the sign-extended Y is XOR'd over the whole
    /// word, so negative Y values also flip the high half.
    #[must_use]
    pub const fn from_coord(gc: Coord) -> Self {
        Self((((gc.x as i64) << 32) ^ (gc.y as i64)) as u64)
    }

    /// Returns the raw seed value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Identifier shared by all fragments of one logical map payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId(i32);

impl PacketId {
    /// Creates a packet ID from a raw value.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// Small integer naming a tile-set binding. Tile arrays store these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilesetId(u8);

impl TilesetId {
    /// Creates a tile-set ID from a raw value.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl From<u8> for TilesetId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}
