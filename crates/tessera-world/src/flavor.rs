//! Deterministic placement of decorative objects.
//!
//! Placement is a pure function of the grid coordinate and the tile-sets
//! involved: every tile gets its own generator seeded from the grid identity
//! mixed with the tile's local x and then y, using `fastrand`'s wyrand.

use std::sync::Arc;

use tessera_common::{Coord, GridId};

use crate::grid::Grid;
use crate::tileset::{TilesetError, TilesetRegistry};

/// A decorative object placed on one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorObject {
    /// Tile in grid-local coordinates
    pub local: Coord,
    /// World position of the tile's corner
    pub position: Coord,
    /// Resource to draw
    pub resource: String,
    /// Seed for any further per-object randomness
    pub seed: u64,
}

/// Seed of the generator for the tile at `local` in grid `id`.
#[must_use]
pub fn tile_seed(id: GridId, local: Coord) -> u64 {
    let mut rng = fastrand::Rng::with_seed(id.raw());
    let mut rng = fastrand::Rng::with_seed(rng.u64(..) ^ local.x as u64);
    rng.u64(..) ^ local.y as u64
}

/// Places decorative objects for every tile of `grid`.
///
/// Fails with `NotReady` if any tile-set involved is still loading. Tiles
/// without a world position at `tile_size` get no object.
pub fn generate(
    grid: &Grid,
    tilesets: &TilesetRegistry,
    tile_size: Coord,
) -> Result<Vec<FlavorObject>, TilesetError> {
    let extent = grid.extent();
    let mut objects = Vec::new();
    for y in 0..extent.y {
        for x in 0..extent.x {
            let local = Coord::new(x, y);
            let set = tilesets.resolve(grid.tile(local))?;
            if !set.has_flavor() {
                continue;
            }
            let seed = tile_seed(grid.id(), local);
            let mut rng = fastrand::Rng::with_seed(seed);
            if rng.u32(..set.flavor_prob()) != 0 {
                continue;
            }
            let Some(position) = grid.world_position(local, tile_size) else {
                continue;
            };
            if let Some(choice) = set.pick(&mut rng) {
                objects.push(FlavorObject {
                    local,
                    position,
                    resource: choice.resource.clone(),
                    seed,
                });
            }
        }
    }
    Ok(objects)
}

/// Returns the grid's decorative objects, generating them on first access.
///
/// The result lives as long as the grid; a failed attempt is not cached.
pub fn flavor_objects(
    grid: &Grid,
    tilesets: &TilesetRegistry,
    tile_size: Coord,
) -> Result<Arc<[FlavorObject]>, TilesetError> {
    if let Some(objects) = grid.flavor_cell().get() {
        return Ok(Arc::clone(objects));
    }
    let objects: Arc<[FlavorObject]> = generate(grid, tilesets, tile_size)?.into();
    Ok(Arc::clone(grid.flavor_cell().get_or_init(|| objects)))
}
