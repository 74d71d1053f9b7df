//! Grid update decoding.
//!
//! A reassembled update carries a zlib stream which inflates to:
//! 1. one `u8` tile-set id per tile, row-major
//! 2. plot records `(u8 flag index, u8 type, u8 x1, u8 y1, u8 x2, u8 y2)`,
//!    terminated by a flag index of 255
//!
//! Each plot ORs one overlay bit into every tile of its inclusive rectangle.
//! The bit depends on the plot type and bit 0 of the referenced flag.

use flate2::{Decompress, FlushDecompress, Status};
use tessera_common::{Coord, MessageReader, WireError};
use thiserror::Error;

use crate::grid::{Grid, OL_PLOT_OTHER, OL_PLOT_OTHER_FLAGGED, OL_PLOT_OWN, OL_PLOT_OWN_FLAGGED};
use crate::message::{FlagTable, TABLE_END};

/// Output buffer growth step while inflating.
const INFLATE_CHUNK: usize = 10_000;

/// Errors that make a single grid update unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Update header or body ended early
    #[error("malformed map data: {0}")]
    Wire(#[from] WireError),

    /// Compressed stream is corrupt
    #[error("malformed map blob: {0}")]
    Corrupt(String),

    /// Compressed stream ended before its end marker
    #[error("unterminated map blob")]
    Unterminated,

    /// Grid coordinate too far out for its tiles to be addressed
    #[error("grid {gc} lies outside the addressable map for extent {extent}")]
    OutOfRange {
        /// Grid coordinate
        gc: Coord,
        /// Grid extent
        extent: Coord,
    },

    /// Plot record with a type other than 0 or 1
    #[error("unknown plot type {0}")]
    UnknownPlotType(u8),

    /// Plot rectangle reaches outside the grid
    #[error("plot rectangle {c1}..={c2} outside grid of extent {extent}")]
    PlotOutOfBounds {
        /// First corner
        c1: Coord,
        /// Second corner
        c2: Coord,
        /// Grid extent
        extent: Coord,
    },
}

/// Inflates a complete zlib stream.
///
/// Fails if the stream is corrupt or stops before its end marker; bytes after
/// the end marker are ignored.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut z = Decompress::new(true);
    let mut out = Vec::with_capacity(INFLATE_CHUNK);
    loop {
        if out.len() == out.capacity() {
            out.reserve(INFLATE_CHUNK);
        }
        let (before_in, before_out) = (z.total_in(), z.total_out());
        let input = compressed.get(before_in as usize..).unwrap_or_default();
        let status = z
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
        if status == Status::StreamEnd {
            return Ok(out);
        }
        // Output had room, so no progress means the input ran dry
        if z.total_in() == before_in && z.total_out() == before_out {
            return Err(DecodeError::Unterminated);
        }
    }
}

/// Maps a plot type and its flag to the overlay bit it sets.
pub fn plot_mask(plot_type: u8, flag: u8) -> Result<u32, DecodeError> {
    let flagged = flag & 1 == 1;
    match (plot_type, flagged) {
        (0, false) => Ok(OL_PLOT_OWN),
        (0, true) => Ok(OL_PLOT_OWN_FLAGGED),
        (1, false) => Ok(OL_PLOT_OTHER),
        (1, true) => Ok(OL_PLOT_OTHER_FLAGGED),
        (other, _) => Err(DecodeError::UnknownPlotType(other)),
    }
}

/// Checks that every tile of grid `gc` has both a tile coordinate and a
/// world position that fit `i32`.
pub fn check_range(gc: Coord, extent: Coord, tile_size: Coord) -> Result<(), DecodeError> {
    let last = Coord::new(extent.x - 1, extent.y - 1);
    let in_range = gc
        .checked_mul_coord(extent)
        .filter(|ul| ul.checked_mul_coord(tile_size).is_some())
        .and_then(|ul| ul.checked_add_coord(last))
        .and_then(|lr| lr.checked_mul_coord(tile_size))
        .is_some();
    if in_range {
        Ok(())
    } else {
        Err(DecodeError::OutOfRange { gc, extent })
    }
}

/// Builds a grid from an inflated update body.
///
/// Elevation is not part of this update format and stays zero.
pub fn decode_grid(
    gc: Coord,
    extent: Coord,
    name: Option<String>,
    flags: &FlagTable,
    body: &[u8],
) -> Result<Grid, DecodeError> {
    let mut grid = Grid::new(gc, extent).ok_or(DecodeError::OutOfRange { gc, extent })?;
    grid.set_name(name);
    let mut r = MessageReader::new(body);

    for tile in grid.tiles_mut() {
        *tile = r.u8()?;
    }

    let overlay = grid.overlays_mut();
    overlay.fill(0);
    loop {
        let index = r.u8()?;
        if index == TABLE_END {
            break;
        }
        let plot_type = r.u8()?;
        let c1 = Coord::new(i32::from(r.u8()?), i32::from(r.u8()?));
        let c2 = Coord::new(i32::from(r.u8()?), i32::from(r.u8()?));
        let mask = plot_mask(plot_type, flags.get(index))?;
        if c1.x > c2.x || c1.y > c2.y {
            continue;
        }
        if c2.x >= extent.x || c2.y >= extent.y {
            return Err(DecodeError::PlotOutOfBounds { c1, c2, extent });
        }
        for y in c1.y..=c2.y {
            for x in c1.x..=c2.x {
                overlay[x as usize + y as usize * extent.x as usize] |= mask;
            }
        }
    }

    Ok(grid)
}
