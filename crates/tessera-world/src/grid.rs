//! Grid data structure.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tessera_common::{Coord, GridId, TilesetId};

use crate::flavor::FlavorObject;

/// Overlay bit for a type 0 plot with flag bit 0 clear.
pub const OL_PLOT_OWN: u32 = 1;
/// Overlay bit for a type 0 plot with flag bit 0 set.
pub const OL_PLOT_OWN_FLAGGED: u32 = 2;
/// Overlay bit for a type 1 plot with flag bit 0 clear.
pub const OL_PLOT_OTHER: u32 = 4;
/// Overlay bit for a type 1 plot with flag bit 0 set.
pub const OL_PLOT_OTHER_FLAGGED: u32 = 8;

/// A fixed-size chunk of the tile map.
///
/// Grids are immutable once decoded. Newer content for the same coordinate
/// arrives as a whole new `Grid` that replaces this one in the cache.
pub struct Grid {
    /// Grid coordinate
    gc: Coord,
    /// Tile-space origin, `gc * extent`
    ul: Coord,
    /// Size in tiles
    extent: Coord,
    /// Identity seed derived from `gc`
    id: GridId,
    /// Minimap name, if the server gave one
    name: Option<String>,
    /// Tile-set id per tile (row-major)
    tiles: Vec<u8>,
    /// Elevation per tile (row-major)
    elevation: Vec<i32>,
    /// Overlay mask per tile (row-major)
    overlay: Vec<u32>,
    /// Decorative objects, built on first access
    flavor: OnceLock<Arc<[FlavorObject]>>,
}

impl Grid {
    /// Creates a grid with every tile, elevation and overlay slot zeroed.
    ///
    /// Returns `None` if the grid's tiles are not addressable in `i32` tile
    /// space.
    #[must_use]
    pub fn new(gc: Coord, extent: Coord) -> Option<Self> {
        let ul = tile_origin(gc, extent)?;
        let area = extent.area();
        Some(Self {
            gc,
            ul,
            extent,
            id: GridId::from_coord(gc),
            name: None,
            tiles: vec![0; area],
            elevation: vec![0; area],
            overlay: vec![0; area],
            flavor: OnceLock::new(),
        })
    }

    /// Creates a grid from decoded arrays.
    ///
    /// Returns `None` if an array length does not match `extent`, or if the
    /// grid's tiles are not addressable in `i32` tile space.
    #[must_use]
    pub fn from_parts(
        gc: Coord,
        extent: Coord,
        name: Option<String>,
        tiles: Vec<u8>,
        elevation: Vec<i32>,
        overlay: Vec<u32>,
    ) -> Option<Self> {
        let area = extent.area();
        if tiles.len() != area || elevation.len() != area || overlay.len() != area {
            return None;
        }
        Some(Self {
            gc,
            ul: tile_origin(gc, extent)?,
            extent,
            id: GridId::from_coord(gc),
            name,
            tiles,
            elevation,
            overlay,
            flavor: OnceLock::new(),
        })
    }

    /// Returns the grid coordinate.
    #[must_use]
    pub const fn gc(&self) -> Coord {
        self.gc
    }

    /// Returns the tile-space coordinate of the upper-left tile.
    #[must_use]
    pub const fn ul(&self) -> Coord {
        self.ul
    }

    /// World position of the corner of the tile at grid-local `local`, or
    /// `None` if it does not fit `i32`.
    #[must_use]
    pub const fn world_position(&self, local: Coord, tile_size: Coord) -> Option<Coord> {
        match self.ul.checked_add_coord(local) {
            Some(tc) => tc.checked_mul_coord(tile_size),
            None => None,
        }
    }

    /// Returns true if every tile of this grid has a world position at the
    /// given tile size.
    #[must_use]
    pub const fn fits_world(&self, tile_size: Coord) -> bool {
        let last = Coord::new(self.extent.x - 1, self.extent.y - 1);
        self.world_position(Coord::ZERO, tile_size).is_some()
            && self.world_position(last, tile_size).is_some()
    }

    /// Returns the grid size in tiles.
    #[must_use]
    pub const fn extent(&self) -> Coord {
        self.extent
    }

    /// Returns the identity seed.
    #[must_use]
    pub const fn id(&self) -> GridId {
        self.id
    }

    /// Returns the minimap name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn index(&self, local: Coord) -> usize {
        debug_assert!(local.index_in(self.extent).is_some(), "local {local} outside grid");
        local.x as usize + local.y as usize * self.extent.x as usize
    }

    /// Tile-set id of the tile at grid-local `local`.
    ///
    /// # Panics
    /// Panics if `local` is outside `[0, extent)`.
    #[must_use]
    pub fn tile(&self, local: Coord) -> TilesetId {
        TilesetId::new(self.tiles[self.index(local)])
    }

    /// Elevation of the tile at grid-local `local`.
    ///
    /// # Panics
    /// Panics if `local` is outside `[0, extent)`.
    #[must_use]
    pub fn elevation(&self, local: Coord) -> i32 {
        self.elevation[self.index(local)]
    }

    /// Server-authored overlay mask of the tile at grid-local `local`.
    ///
    /// # Panics
    /// Panics if `local` is outside `[0, extent)`.
    #[must_use]
    pub fn overlay(&self, local: Coord) -> u32 {
        self.overlay[self.index(local)]
    }

    /// Returns the raw tile array.
    #[must_use]
    pub fn tiles(&self) -> &[u8] {
        &self.tiles
    }

    /// Returns the raw elevation array.
    #[must_use]
    pub fn elevations(&self) -> &[i32] {
        &self.elevation
    }

    /// Returns the raw overlay array.
    #[must_use]
    pub fn overlays(&self) -> &[u32] {
        &self.overlay
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut [u8] {
        &mut self.tiles
    }

    pub(crate) fn overlays_mut(&mut self) -> &mut [u32] {
        &mut self.overlay
    }

    pub(crate) fn flavor_cell(&self) -> &OnceLock<Arc<[FlavorObject]>> {
        &self.flavor
    }
}

/// Tile-space origin of grid `gc`, if both its first and last tile fit `i32`.
fn tile_origin(gc: Coord, extent: Coord) -> Option<Coord> {
    let ul = gc.checked_mul_coord(extent)?;
    ul.checked_add_coord(Coord::new(extent.x - 1, extent.y - 1))?;
    Some(ul)
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("gc", &self.gc)
            .field("extent", &self.extent)
            .field("name", &self.name)
            .field("flavor_built", &self.flavor.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(Coord::new(2, -3), Coord::new(100, 100)).expect("in range");
        assert_eq!(grid.gc(), Coord::new(2, -3));
        assert_eq!(grid.ul(), Coord::new(200, -300));
        assert_eq!(grid.tiles().len(), 100 * 100);
        assert_eq!(grid.id(), GridId::from_coord(Coord::new(2, -3)));
        assert!(grid.name().is_none());
    }

    #[test]
    fn test_row_major_layout() {
        let extent = Coord::new(4, 3);
        let mut tiles = vec![0u8; 12];
        tiles[1 + 2 * 4] = 9;
        let grid = Grid::from_parts(Coord::ZERO, extent, None, tiles, vec![0; 12], vec![0; 12])
            .expect("sizes match");
        assert_eq!(grid.tile(Coord::new(1, 2)), TilesetId::new(9));
        assert_eq!(grid.tile(Coord::new(2, 1)), TilesetId::new(0));
    }

    #[test]
    fn test_from_parts_rejects_wrong_length() {
        let extent = Coord::new(4, 4);
        assert!(Grid::from_parts(Coord::ZERO, extent, None, vec![0; 15], vec![0; 16], vec![0; 16]).is_none());
    }

    #[test]
    fn test_far_grid_is_not_addressable() {
        let extent = Coord::new(100, 100);
        assert!(Grid::new(Coord::new(1_000_000_000, 0), extent).is_none());
        assert!(Grid::new(Coord::new(0, -30_000_000), extent).is_none());
        // Origin fits but the last tile does not
        assert!(Grid::new(Coord::new(i32::MAX / 100, 0), extent).is_none());
        assert!(Grid::from_parts(Coord::new(-1_000_000_000, 0), extent, None, vec![0; 10_000], vec![0; 10_000], vec![0; 10_000]).is_none());
    }

    #[test]
    fn test_world_position_range() {
        let tile = Coord::new(11, 11);
        let grid = Grid::new(Coord::new(-1, 2), Coord::new(4, 4)).expect("in range");
        assert_eq!(grid.world_position(Coord::new(3, 0), tile), Some(Coord::new(-11, 88)));
        assert!(grid.fits_world(tile));

        let far = Grid::new(Coord::new(100_000_000, 0), Coord::new(4, 4)).expect("in range");
        assert!(!far.fits_world(tile));
        assert_eq!(far.world_position(Coord::ZERO, tile), None);
    }
}
