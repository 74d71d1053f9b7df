//! Client-side highlight regions merged into overlay reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tessera_common::Coord;

/// Rectangle in tile space with the overlay bits it adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRegion {
    /// First corner, inclusive
    pub c1: Coord,
    /// Second corner, inclusive
    pub c2: Coord,
    /// Bits OR'd into every covered tile
    pub mask: u32,
}

impl OverlayRegion {
    /// Returns true if `tc` lies inside the region.
    #[must_use]
    pub const fn contains(&self, tc: Coord) -> bool {
        tc.within(self.c1, self.c2)
    }
}

#[derive(Debug, Default)]
struct Regions {
    next_id: AtomicU64,
    live: RwLock<AHashMap<u64, OverlayRegion>>,
}

/// Shared set of live overlay regions.
///
/// Regions live until their handle is destroyed, independent of which grids
/// are cached.
#[derive(Debug, Clone, Default)]
pub struct OverlaySet {
    regions: Arc<Regions>,
}

impl OverlaySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region and returns the handle that owns it.
    #[must_use]
    pub fn create(&self, c1: Coord, c2: Coord, mask: u32) -> OverlayHandle {
        let id = self.regions.next_id.fetch_add(1, Ordering::Relaxed);
        self.regions.live.write().insert(id, OverlayRegion { c1, c2, mask });
        OverlayHandle {
            id,
            regions: Arc::clone(&self.regions),
        }
    }

    /// OR of the masks of every region containing `tc`.
    #[must_use]
    pub fn mask_at(&self, tc: Coord) -> u32 {
        self.regions
            .live
            .read()
            .values()
            .filter(|r| r.contains(tc))
            .fold(0, |acc, r| acc | r.mask)
    }

    /// Number of live regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.live.read().len()
    }

    /// Returns true if no region is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.live.read().is_empty()
    }
}

/// Owner of one overlay region.
///
/// Dropping the handle leaves the region in place; call
/// [`destroy`](Self::destroy) to remove it.
#[derive(Debug)]
pub struct OverlayHandle {
    id: u64,
    regions: Arc<Regions>,
}

impl OverlayHandle {
    /// Moves the region to `[c1, c2]`.
    pub fn update(&self, c1: Coord, c2: Coord) {
        if let Some(region) = self.regions.live.write().get_mut(&self.id) {
            region.c1 = c1;
            region.c2 = c2;
        }
    }

    /// Replaces the region's mask.
    pub fn set_mask(&self, mask: u32) {
        if let Some(region) = self.regions.live.write().get_mut(&self.id) {
            region.mask = mask;
        }
    }

    /// Current region, or `None` once destroyed.
    #[must_use]
    pub fn region(&self) -> Option<OverlayRegion> {
        self.regions.live.read().get(&self.id).copied()
    }

    /// Removes the region.
    pub fn destroy(self) {
        self.regions.live.write().remove(&self.id);
    }
}
