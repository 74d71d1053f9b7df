//! Grid cache and the session-facing map interface.
//!
//! [`MapCache`] gives readers a consistent view of an unbounded tile map
//! while grids arrive asynchronously. A read of a grid that has not arrived
//! returns [`NotReady`] and, as a side effect, queues a request for it;
//! [`MapCache::send_requests`] puts queued requests on the wire.
//!
//! Three independent exclusion domains:
//! - grid store, pending requests and the fast-path entry, under one lock
//! - fragment buffers
//! - overlay regions

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use tessera_common::{Coord, NotReady, Ready, TilesetId};
use tracing::{debug, info, warn};

use crate::config::MapConfig;
use crate::decode;
use crate::error::{MapError, MapResult};
use crate::flavor::{self, FlavorObject};
use crate::fragment::FragmentReassembler;
use crate::grid::Grid;
use crate::message::{InvalidateMessage, MapData, MapFragment, TilesetMapping};
use crate::overlay::{OverlayHandle, OverlaySet};
use crate::request::{GridRequest, PendingRequest, RequestTable, RetryPolicy};
use crate::resource::ResourceLoader;
use crate::tileset::{Tileset, TilesetError, TilesetRegistry};

/// What a map payload did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapUpdate {
    /// Fragment stored, payload not complete yet
    Incomplete,
    /// Grid decoded and installed
    Installed(Coord),
    /// Nobody was waiting for this grid, update ignored
    Stale(Coord),
}

/// Where one grid coordinate stands, read under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    /// Neither held nor requested
    Absent,
    /// Requested, not yet arrived
    Requested,
    /// Held
    Cached,
    /// Held, with a replacement requested
    Refreshing,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Grids held
    pub grids: usize,
    /// Grid requests outstanding
    pub pending_requests: usize,
    /// Payloads being reassembled
    pub fragment_buffers: usize,
    /// Live overlay regions
    pub overlays: usize,
    /// Bound tile-set ids
    pub tilesets: usize,
}

/// Everything that must change atomically when a grid comes or goes.
#[derive(Debug, Default)]
struct GridStore {
    grids: AHashMap<Coord, Arc<Grid>>,
    requests: RequestTable,
    /// Most recently resolved grid
    last: Option<Arc<Grid>>,
}

impl GridStore {
    fn lookup(&mut self, gc: Coord) -> Ready<Arc<Grid>> {
        // The fast path only holds if the remembered grid is the one asked for
        if let Some(last) = self.last.as_ref().filter(|g| g.gc() == gc) {
            return Ok(Arc::clone(last));
        }
        if let Some(grid) = self.grids.get(&gc) {
            self.last = Some(Arc::clone(grid));
            return Ok(Arc::clone(grid));
        }
        if self.requests.register(gc) {
            debug!("Grid {gc} missing, queued request");
        }
        Err(NotReady)
    }

    fn replace(&mut self, grid: Arc<Grid>) -> Option<Arc<Grid>> {
        let gc = grid.gc();
        self.requests.remove(gc);
        if self.last.as_ref().is_some_and(|g| g.gc() == gc) {
            self.last = None;
        }
        self.grids.insert(gc, grid)
    }
}

/// Client-side cache of map grids for one session.
pub struct MapCache {
    config: MapConfig,
    store: Mutex<GridStore>,
    fragments: Mutex<FragmentReassembler>,
    tilesets: TilesetRegistry,
    overlays: OverlaySet,
    outbound: Sender<GridRequest>,
}

impl MapCache {
    /// Creates an empty cache.
    ///
    /// Tile-set resources are fetched through `loader`; grid requests are
    /// sent on `outbound`. A config whose grid extent cannot address tiles
    /// is replaced by the defaults.
    #[must_use]
    pub fn new(
        config: MapConfig,
        loader: Arc<dyn ResourceLoader>,
        outbound: Sender<GridRequest>,
    ) -> Self {
        let config = if config.is_valid() {
            config
        } else {
            warn!("Map config has a non-positive grid extent {}, using defaults", config.grid_extent);
            MapConfig::default()
        };
        let fragments = FragmentReassembler::new(config.fragment_timeout());
        Self {
            config,
            store: Mutex::new(GridStore::default()),
            fragments: Mutex::new(fragments),
            tilesets: TilesetRegistry::new(loader),
            overlays: OverlaySet::new(),
            outbound,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Returns the tile-set registry.
    #[must_use]
    pub const fn tilesets(&self) -> &TilesetRegistry {
        &self.tilesets
    }

    /// Returns the overlay region set.
    #[must_use]
    pub const fn overlays(&self) -> &OverlaySet {
        &self.overlays
    }

    // === Reads ===

    /// Returns the grid at `gc`, or `NotReady` after queueing a request.
    pub fn grid(&self, gc: Coord) -> Ready<Arc<Grid>> {
        self.store.lock().lookup(gc)
    }

    /// Returns the grid owning tile `tc`.
    pub fn grid_at_tile(&self, tc: Coord) -> Ready<Arc<Grid>> {
        self.grid(tc.div_coord(self.config.grid_extent))
    }

    /// Tile-set id of tile `tc`.
    pub fn tile(&self, tc: Coord) -> Ready<TilesetId> {
        let grid = self.grid_at_tile(tc)?;
        Ok(grid.tile(tc - grid.ul()))
    }

    /// Elevation of tile `tc`.
    pub fn elevation(&self, tc: Coord) -> Ready<i32> {
        let grid = self.grid_at_tile(tc)?;
        Ok(grid.elevation(tc - grid.ul()))
    }

    /// Overlay mask of tile `tc`: the server-authored bits plus those of
    /// every overlay region covering it.
    pub fn overlay(&self, tc: Coord) -> Ready<u32> {
        let grid = self.grid_at_tile(tc)?;
        Ok(grid.overlay(tc - grid.ul()) | self.overlays.mask_at(tc))
    }

    /// Resolves a tile-set id.
    pub fn tileset(&self, id: TilesetId) -> Result<Arc<Tileset>, TilesetError> {
        self.tilesets.resolve(id)
    }

    /// Tile-set of tile `tc`.
    pub fn tileset_at(&self, tc: Coord) -> Result<Arc<Tileset>, TilesetError> {
        let id = self.tile(tc)?;
        self.tilesets.resolve(id)
    }

    /// Decorative objects of the grid at `gc`.
    pub fn flavor_objects(&self, gc: Coord) -> Result<Arc<[FlavorObject]>, TilesetError> {
        let grid = self.grid(gc)?;
        flavor::flavor_objects(&grid, &self.tilesets, self.config.tile_size)
    }

    /// Returns true if a grid is held for `gc`. Does not queue a request.
    #[must_use]
    pub fn is_cached(&self, gc: Coord) -> bool {
        self.store.lock().grids.contains_key(&gc)
    }

    /// Whether `gc` is held, requested, or both. Does not queue a request.
    #[must_use]
    pub fn state(&self, gc: Coord) -> GridState {
        let store = self.store.lock();
        match (store.grids.contains_key(&gc), store.requests.contains(gc)) {
            (false, false) => GridState::Absent,
            (false, true) => GridState::Requested,
            (true, false) => GridState::Cached,
            (true, true) => GridState::Refreshing,
        }
    }

    /// Retry state of the request for `gc`, if one is outstanding.
    #[must_use]
    pub fn pending(&self, gc: Coord) -> Option<PendingRequest> {
        self.store.lock().requests.get(gc).copied()
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (grids, pending_requests) = {
            let store = self.store.lock();
            (store.grids.len(), store.requests.len())
        };
        CacheStats {
            grids,
            pending_requests,
            fragment_buffers: self.fragments.lock().pending(),
            overlays: self.overlays.len(),
            tilesets: self.tilesets.len(),
        }
    }

    // === Mutation ===

    /// Stores `grid`, replacing any grid at the same coordinate and clearing
    /// its request. Returns the replaced grid.
    pub fn install(&self, grid: Grid) -> MapResult<Option<Arc<Grid>>> {
        self.check_geometry(&grid)?;
        let gc = grid.gc();
        let old = self.store.lock().replace(Arc::new(grid));
        debug!("Installed grid {gc}");
        Ok(old)
    }

    /// Stores `grid` only if a request for it is outstanding. Returns true if
    /// it was stored.
    fn install_requested(&self, grid: Grid) -> MapResult<bool> {
        self.check_geometry(&grid)?;
        let gc = grid.gc();
        let mut store = self.store.lock();
        if !store.requests.contains(gc) {
            return Ok(false);
        }
        store.replace(Arc::new(grid));
        drop(store);
        debug!("Installed grid {gc}");
        Ok(true)
    }

    fn check_geometry(&self, grid: &Grid) -> MapResult<()> {
        if grid.extent() != self.config.grid_extent {
            return Err(MapError::ExtentMismatch {
                gc: grid.gc(),
                expected: self.config.grid_extent,
                actual: grid.extent(),
            });
        }
        if !grid.fits_world(self.config.tile_size) {
            return Err(MapError::OutOfRange { gc: grid.gc() });
        }
        Ok(())
    }

    /// Queues a re-fetch of `gc`. A held grid stays readable until its
    /// replacement arrives.
    pub fn invalidate(&self, gc: Coord) {
        if self.store.lock().requests.register(gc) {
            debug!("Invalidated grid {gc}");
        }
    }

    /// Drops every grid and request outside the inclusive rectangle
    /// `[ul, lr]` of grid coordinates.
    pub fn trim(&self, ul: Coord, lr: Coord) {
        let mut store = self.store.lock();
        let before = store.grids.len();
        store.grids.retain(|gc, _| gc.within(ul, lr));
        let grids = before - store.grids.len();
        let requests = store.requests.retain_within(ul, lr);
        if store.last.as_ref().is_some_and(|g| !g.gc().within(ul, lr)) {
            store.last = None;
        }
        drop(store);
        if grids + requests > 0 {
            info!("Trimmed map to {ul}..={lr}: dropped {grids} grids, {requests} requests");
        }
    }

    /// Drops every grid and request.
    pub fn trim_all(&self) {
        let mut store = self.store.lock();
        store.grids.clear();
        store.requests.clear();
        store.last = None;
        drop(store);
        info!("Dropped all map grids");
    }

    /// Sends every request that is due. Returns the number sent.
    pub fn send_requests(&self) -> usize {
        self.send_requests_at(Instant::now())
    }

    /// Sends every request that is due at `now`. Returns the number sent.
    pub fn send_requests_at(&self, now: Instant) -> usize {
        let policy = RetryPolicy {
            interval: self.config.request_interval(),
            max_attempts: self.config.max_request_attempts,
        };
        let due = self.store.lock().requests.poll(now, policy);
        let mut sent = 0;
        for req in due {
            match self.outbound.try_send(req) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(req)) => {
                    warn!("Outbound queue full, grid request {} deferred to next retry", req.gc);
                },
                Err(TrySendError::Disconnected(_)) => {
                    warn!("Session gone, dropping grid requests");
                    break;
                },
            }
        }
        sent
    }

    /// Creates an overlay region.
    #[must_use]
    pub fn create_overlay(&self, c1: Coord, c2: Coord, mask: u32) -> OverlayHandle {
        self.overlays.create(c1, c2, mask)
    }

    // === Inbound messages ===

    /// Applies an invalidate message.
    pub fn apply_invalidate(&self, msg: InvalidateMessage) {
        match msg {
            InvalidateMessage::Grid(gc) => self.invalidate(gc),
            InvalidateMessage::Trim { ul, lr } => self.trim(ul, lr),
            InvalidateMessage::TrimAll => self.trim_all(),
        }
    }

    /// Handles a raw invalidate message body.
    pub fn handle_invalidate(&self, body: &[u8]) -> MapResult<()> {
        match InvalidateMessage::parse(body) {
            Ok(Some(msg)) => self.apply_invalidate(msg),
            Ok(None) => debug!("Ignoring unknown invalidate type"),
            Err(e) => {
                warn!("Dropping invalidate message: {e}");
                return Err(e.into());
            },
        }
        Ok(())
    }

    /// Handles a raw tile-set mapping message body. Returns the number of
    /// ids bound. Nothing is bound if the body is malformed.
    pub fn handle_tileset_mapping(&self, body: &[u8]) -> MapResult<usize> {
        let mappings = TilesetMapping::parse_all(body).map_err(|e| {
            warn!("Dropping tile-set mapping message: {e}");
            MapError::from(e)
        })?;
        for m in &mappings {
            self.tilesets.set_mapping(m.id, &m.name, m.version);
        }
        Ok(mappings.len())
    }

    /// Handles a raw map fragment message body.
    pub fn handle_fragment(&self, body: &[u8]) -> MapResult<MapUpdate> {
        let fragment = MapFragment::parse(body).map_err(|e| {
            warn!("Dropping map fragment: {e}");
            MapError::from(e)
        })?;
        self.accept_fragment(&fragment, Instant::now())
    }

    /// Feeds one fragment received at `now`, decoding the payload once it is
    /// complete.
    pub fn accept_fragment(&self, fragment: &MapFragment, now: Instant) -> MapResult<MapUpdate> {
        let complete = self.fragments.lock().accept(fragment, now);
        match complete {
            Ok(Some(payload)) => self.handle_map_data(&payload),
            Ok(None) => Ok(MapUpdate::Incomplete),
            Err(e) => {
                warn!("Dropping map fragment: {e}");
                Err(e.into())
            },
        }
    }

    /// Decodes a reassembled grid update and installs it if the grid was
    /// requested.
    pub fn handle_map_data(&self, payload: &[u8]) -> MapResult<MapUpdate> {
        let result = self.decode_and_install(payload);
        if let Err(e) = &result {
            warn!("Dropping grid update: {e}");
        }
        result
    }

    fn decode_and_install(&self, payload: &[u8]) -> MapResult<MapUpdate> {
        let data = MapData::parse(payload)?;
        let gc = data.gc;
        decode::check_range(gc, self.config.grid_extent, self.config.tile_size)?;
        let body = decode::inflate(data.compressed)?;
        if !self.store.lock().requests.contains(gc) {
            debug!("Ignoring unrequested update for grid {gc}");
            return Ok(MapUpdate::Stale(gc));
        }
        let grid = decode::decode_grid(gc, self.config.grid_extent, data.name, &data.flags, &body)?;
        if self.install_requested(grid)? {
            Ok(MapUpdate::Installed(gc))
        } else {
            Ok(MapUpdate::Stale(gc))
        }
    }
}

impl std::fmt::Debug for MapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::zlib;
    use crate::message::TABLE_END;
    use crate::resource::StaticResource;
    use crate::tileset::tests::{grass, MemoryLoader};
    use crossbeam_channel::Receiver;
    use proptest::prelude::*;
    use std::time::Duration;
    use tessera_common::{MessageWriter, PacketId};

    const EXTENT: Coord = Coord::new(4, 4);

    fn cache() -> (MapCache, Receiver<GridRequest>, Arc<MemoryLoader>) {
        let config = MapConfig {
            grid_extent: EXTENT,
            ..MapConfig::default()
        };
        let loader = Arc::new(MemoryLoader::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let cache = MapCache::new(config, Arc::clone(&loader) as Arc<dyn ResourceLoader>, tx);
        (cache, rx, loader)
    }

    fn grid(gc: Coord, fill: u8) -> Grid {
        let area = EXTENT.area();
        Grid::from_parts(gc, EXTENT, None, vec![fill; area], vec![0; area], vec![0; area])
            .expect("sizes match")
    }

    fn update(gc: Coord, tiles: &[u8], plots: &[[u8; 6]], flags: &[(u8, u8)]) -> Vec<u8> {
        let mut body = MessageWriter::new();
        body.bytes(tiles);
        for plot in plots {
            body.bytes(plot);
        }
        body.u8(TABLE_END);

        let mut w = MessageWriter::new();
        w.coord(gc).string("");
        for &(idx, flag) in flags {
            w.u8(idx).u8(flag);
        }
        w.u8(TABLE_END).bytes(&zlib(&body.finish()));
        w.finish()
    }

    fn assert_exclusive(cache: &MapCache) {
        let store = cache.store.lock();
        for gc in store.requests.coords() {
            assert!(!store.grids.contains_key(&gc), "{gc} both cached and pending");
        }
    }

    #[test]
    fn test_miss_is_not_ready_and_queues_request() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(1, 2);
        assert_eq!(cache.grid(gc).map(|_| ()), Err(NotReady));
        assert_eq!(cache.pending(gc), Some(PendingRequest::default()));
        // A second miss keeps the same request
        assert!(cache.grid(gc).is_err());
        assert_eq!(cache.stats().pending_requests, 1);
    }

    #[test]
    fn test_install_then_lookup() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(-3, 5);
        assert!(cache.grid(gc).is_err());
        cache.install(grid(gc, 7)).expect("install");

        let g = cache.grid(gc).expect("cached");
        assert_eq!(g.gc(), gc);
        assert!(cache.pending(gc).is_none());
        assert_exclusive(&cache);
    }

    #[test]
    fn test_tile_reads_use_floor_division() {
        let (cache, _rx, _) = cache();
        let mut tiles = vec![0u8; 16];
        tiles[3 + 3 * 4] = 42;
        let g = Grid::from_parts(Coord::new(-1, -1), EXTENT, None, tiles, vec![0; 16], vec![0; 16])
            .expect("sizes match");
        cache.install(g).expect("install");

        assert_eq!(cache.tile(Coord::new(-1, -1)), Ok(TilesetId::new(42)));
        assert_eq!(cache.tile(Coord::new(-4, -4)), Ok(TilesetId::new(0)));
        assert_eq!(cache.elevation(Coord::new(-2, -3)), Ok(0));
        assert_eq!(cache.tile(Coord::new(0, 0)), Err(NotReady));
        assert!(cache.pending(Coord::new(0, 0)).is_some());
    }

    /// The fast-path entry must be checked against its own coordinate.
    /// Comparing it to the query in any other way would hand out the wrong
    /// grid (or never hit) after alternating lookups.
    #[test]
    fn test_fast_path_checks_grid_coordinate() {
        let (cache, _rx, _) = cache();
        cache.install(grid(Coord::new(0, 0), 1)).expect("install");
        cache.install(grid(Coord::new(1, 0), 2)).expect("install");

        assert_eq!(cache.tile(Coord::new(0, 0)), Ok(TilesetId::new(1)));
        assert_eq!(cache.tile(Coord::new(4, 0)), Ok(TilesetId::new(2)));
        assert_eq!(cache.tile(Coord::new(1, 1)), Ok(TilesetId::new(1)));
        assert_eq!(cache.grid(Coord::new(2, 0)).map(|_| ()), Err(NotReady));
        assert_eq!(cache.tile(Coord::new(5, 1)), Ok(TilesetId::new(2)));
    }

    #[test]
    fn test_replacement_invalidates_fast_path() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(0, 0);
        cache.install(grid(gc, 1)).expect("install");
        assert_eq!(cache.tile(gc), Ok(TilesetId::new(1)));

        let old = cache.install(grid(gc, 9)).expect("install");
        assert!(old.is_some());
        assert_eq!(cache.tile(gc), Ok(TilesetId::new(9)));
    }

    #[test]
    fn test_trim_evicts_fast_path_entry() {
        let (cache, _rx, _) = cache();
        cache.install(grid(Coord::new(5, 5), 1)).expect("install");
        assert!(cache.grid(Coord::new(5, 5)).is_ok());
        cache.trim(Coord::new(0, 0), Coord::new(1, 1));
        assert!(cache.grid(Coord::new(5, 5)).is_err());
    }

    #[test]
    fn test_invalidate_keeps_grid_visible() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(2, 2);
        cache.install(grid(gc, 1)).expect("install");
        cache.invalidate(gc);

        assert!(cache.grid(gc).is_ok());
        assert!(cache.pending(gc).is_some());

        cache.install(grid(gc, 3)).expect("install");
        assert!(cache.pending(gc).is_none());
        assert_eq!(cache.tile(Coord::new(8, 8)), Ok(TilesetId::new(3)));
    }

    #[test]
    fn test_trim_is_inclusive() {
        let (cache, _rx, _) = cache();
        for x in -2..=2 {
            cache.install(grid(Coord::new(x, 0), 0)).expect("install");
            cache.invalidate(Coord::new(x, 1));
        }
        cache.trim(Coord::new(-1, 0), Coord::new(1, 1));

        for x in -2..=2 {
            let inside = (-1..=1).contains(&x);
            assert_eq!(cache.is_cached(Coord::new(x, 0)), inside, "grid {x}");
            assert_eq!(cache.pending(Coord::new(x, 1)).is_some(), inside, "request {x}");
        }
    }

    #[test]
    fn test_trim_all() {
        let (cache, _rx, _) = cache();
        cache.install(grid(Coord::new(0, 0), 0)).expect("install");
        cache.invalidate(Coord::new(1, 1));
        cache.trim_all();
        let stats = cache.stats();
        assert_eq!(stats.grids, 0);
        assert_eq!(stats.pending_requests, 0);
    }

    #[test]
    fn test_install_rejects_wrong_extent() {
        let (cache, _rx, _) = cache();
        let wrong = Grid::new(Coord::ZERO, Coord::new(8, 8)).expect("in range");
        assert!(matches!(cache.install(wrong), Err(MapError::ExtentMismatch { .. })));
        assert!(!cache.is_cached(Coord::ZERO));
    }

    #[test]
    fn test_overlay_merges_regions() {
        let (cache, _rx, _) = cache();
        let mut overlay = vec![0u32; 16];
        overlay[0] = 1;
        let g = Grid::from_parts(Coord::ZERO, EXTENT, None, vec![0; 16], vec![0; 16], overlay)
            .expect("sizes match");
        cache.install(g).expect("install");

        let sel = cache.create_overlay(Coord::new(0, 0), Coord::new(1, 1), 16);
        assert_eq!(cache.overlay(Coord::new(0, 0)), Ok(17));
        assert_eq!(cache.overlay(Coord::new(1, 1)), Ok(16));
        assert_eq!(cache.overlay(Coord::new(2, 1)), Ok(0));
        sel.destroy();
        assert_eq!(cache.overlay(Coord::new(0, 0)), Ok(1));
    }

    #[test]
    fn test_send_requests_retries_then_gives_up() {
        let (cache, rx, _) = cache();
        let gc = Coord::new(9, 9);
        assert!(cache.grid(gc).is_err());

        let t0 = Instant::now();
        let step = Duration::from_millis(1001);
        assert_eq!(cache.send_requests_at(t0), 1);
        assert_eq!(cache.send_requests_at(t0 + Duration::from_millis(200)), 0);
        for i in 1..5 {
            assert_eq!(cache.send_requests_at(t0 + step * i), 1);
        }
        assert_eq!(cache.send_requests_at(t0 + step * 5), 0);
        assert!(cache.pending(gc).is_none());
        assert_eq!(cache.send_requests_at(t0 + step * 6), 0);
        assert_eq!(rx.try_iter().filter(|r| r.gc == gc).count(), 5);

        cache.invalidate(gc);
        assert_eq!(cache.send_requests_at(t0 + step * 7), 1);
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let config = MapConfig {
            grid_extent: EXTENT,
            ..MapConfig::default()
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        let cache = MapCache::new(config, Arc::new(MemoryLoader::default()), tx);
        cache.invalidate(Coord::new(0, 0));
        cache.invalidate(Coord::new(1, 0));
        assert_eq!(cache.send_requests_at(Instant::now()), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_map_data_installs_requested_grid() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(3, -1);
        assert!(cache.grid(gc).is_err());

        let payload = update(gc, &[0; 16], &[[0, 0, 0, 0, 1, 1]], &[(0, 1)]);
        assert_eq!(cache.handle_map_data(&payload), Ok(MapUpdate::Installed(gc)));

        let ul = gc.mul_coord(EXTENT);
        for (x, y) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(cache.overlay(ul + Coord::new(x, y)), Ok(2));
        }
        assert_eq!(cache.overlay(ul + Coord::new(2, 0)), Ok(0));
        assert!(cache.pending(gc).is_none());
    }

    #[test]
    fn test_unrequested_map_data_is_stale() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(0, 0);
        let payload = update(gc, &[0; 16], &[], &[]);
        assert_eq!(cache.handle_map_data(&payload), Ok(MapUpdate::Stale(gc)));
        assert!(!cache.is_cached(gc));
    }

    #[test]
    fn test_malformed_map_data_leaves_cache_untouched() {
        let (cache, _rx, _) = cache();
        let good = Coord::new(0, 0);
        let bad = Coord::new(1, 0);
        cache.install(grid(good, 5)).expect("install");
        cache.invalidate(bad);

        let payload = update(bad, &[0; 16], &[[0, 7, 0, 0, 0, 0]], &[]);
        assert!(matches!(
            cache.handle_map_data(&payload),
            Err(MapError::Decode(decode::DecodeError::UnknownPlotType(7)))
        ));

        let mut truncated = update(bad, &[0; 16], &[], &[]);
        truncated.truncate(truncated.len() - 4);
        assert!(cache.handle_map_data(&truncated).is_err());

        assert_eq!(cache.tile(good), Ok(TilesetId::new(5)));
        assert!(!cache.is_cached(bad));
        assert!(cache.pending(bad).is_some());
    }

    #[test]
    fn test_far_grid_update_is_rejected() {
        let (cache, _rx, _) = cache();
        let far = Coord::new(1_000_000_000, 0);
        let near = Coord::new(0, 0);
        cache.install(grid(near, 2)).expect("install");
        cache
            .handle_invalidate(&MessageWriter::new().u8(0).coord(far).finish())
            .expect("invalidate");

        let payload = update(far, &[0; 16], &[], &[]);
        assert_eq!(
            cache.handle_map_data(&payload),
            Err(MapError::Decode(decode::DecodeError::OutOfRange { gc: far, extent: EXTENT }))
        );
        assert!(!cache.is_cached(far));
        assert_eq!(cache.tile(near), Ok(TilesetId::new(2)));
    }

    #[test]
    fn test_grid_without_world_position_is_rejected() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(100_000_000, 0);
        assert!(matches!(cache.install(grid(gc, 0)), Err(MapError::OutOfRange { .. })));
        assert!(!cache.is_cached(gc));
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let config = MapConfig {
            grid_extent: Coord::new(0, 4),
            ..MapConfig::default()
        };
        let (tx, _rx) = crossbeam_channel::unbounded();
        let cache = MapCache::new(config, Arc::new(MemoryLoader::default()), tx);
        assert_eq!(cache.config(), &MapConfig::default());
        assert_eq!(cache.tile(Coord::new(-1, 7)), Err(NotReady));
        assert!(cache.pending(Coord::new(-1, 0)).is_some());
    }

    #[test]
    fn test_grid_state() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(2, 2);
        assert_eq!(cache.state(gc), GridState::Absent);
        cache.invalidate(gc);
        assert_eq!(cache.state(gc), GridState::Requested);
        cache.install(grid(gc, 0)).expect("install");
        assert_eq!(cache.state(gc), GridState::Cached);
        cache.invalidate(gc);
        assert_eq!(cache.state(gc), GridState::Refreshing);
        cache.trim_all();
        assert_eq!(cache.state(gc), GridState::Absent);
    }

    #[test]
    fn test_fragments_feed_decoder() {
        let (cache, _rx, _) = cache();
        let gc = Coord::new(0, 1);
        cache.invalidate(gc);
        let payload = update(gc, &[1; 16], &[], &[]);
        let total = payload.len() as u16;
        let mid = payload.len() / 2;
        let now = Instant::now();

        let second = MapFragment {
            packet_id: PacketId::new(5),
            offset: mid as u16,
            total_len: total,
            payload: payload[mid..].to_vec(),
        };
        let first = MapFragment {
            packet_id: PacketId::new(5),
            offset: 0,
            total_len: total,
            payload: payload[..mid].to_vec(),
        };
        assert_eq!(cache.accept_fragment(&second, now), Ok(MapUpdate::Incomplete));
        assert_eq!(cache.stats().fragment_buffers, 1);
        assert_eq!(cache.accept_fragment(&first, now), Ok(MapUpdate::Installed(gc)));
        assert_eq!(cache.stats().fragment_buffers, 0);
        assert_eq!(cache.tile(Coord::new(3, 7)), Ok(TilesetId::new(1)));
    }

    #[test]
    fn test_invalidate_message_kinds() {
        let (cache, _rx, _) = cache();
        cache.install(grid(Coord::new(0, 0), 0)).expect("install");
        cache.install(grid(Coord::new(3, 3), 0)).expect("install");

        cache.handle_invalidate(&MessageWriter::new().u8(0).coord(Coord::new(7, 7)).finish()).expect("single");
        assert!(cache.pending(Coord::new(7, 7)).is_some());

        let trim = MessageWriter::new().u8(1).coord(Coord::new(0, 0)).coord(Coord::new(1, 1)).finish();
        cache.handle_invalidate(&trim).expect("trim");
        assert!(cache.is_cached(Coord::new(0, 0)));
        assert!(!cache.is_cached(Coord::new(3, 3)));
        assert!(cache.pending(Coord::new(7, 7)).is_none());

        cache.handle_invalidate(&[2]).expect("trim all");
        assert_eq!(cache.stats().grids, 0);

        assert!(cache.handle_invalidate(&[1, 0]).is_err());
    }

    #[test]
    fn test_tileset_chain_propagates_not_ready() {
        let (cache, _rx, loader) = cache();
        let res = loader.insert(StaticResource::loading("gfx/tiles/grass", 1, Some(grass())));
        let body = MessageWriter::new().u8(0).string("gfx/tiles/grass").u16(1).finish();
        assert_eq!(cache.handle_tileset_mapping(&body), Ok(1));

        // Grid missing
        assert_eq!(
            cache.tileset_at(Coord::new(0, 0)),
            Err(TilesetError::NotReady(NotReady))
        );
        cache.install(grid(Coord::ZERO, 0)).expect("install");
        // Grid present, resource loading
        assert_eq!(
            cache.flavor_objects(Coord::ZERO).map(|v| v.len()),
            Err(TilesetError::NotReady(NotReady))
        );
        res.finish_loading();
        assert!(cache.tileset_at(Coord::new(0, 0)).is_ok());
        let objects = cache.flavor_objects(Coord::ZERO).expect("ready");
        let again = cache.flavor_objects(Coord::ZERO).expect("ready");
        assert!(Arc::ptr_eq(&objects, &again));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Lookup(Coord),
        Install(Coord),
        Trim(Coord, Coord),
        TrimAll,
        Tick(u64),
    }

    fn small_coord() -> impl Strategy<Value = Coord> {
        (-3i32..3, -3i32..3).prop_map(|(x, y)| Coord::new(x, y))
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => small_coord().prop_map(Op::Lookup),
            3 => small_coord().prop_map(Op::Install),
            1 => (small_coord(), small_coord()).prop_map(|(a, b)| Op::Trim(a, b)),
            1 => Just(Op::TrimAll),
            2 => (0u64..3000).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn prop_store_and_requests_stay_exclusive(ops in proptest::collection::vec(op(), 1..60)) {
            let (cache, _rx, _) = cache();
            let mut now = Instant::now();
            for op in ops {
                match op {
                    Op::Lookup(gc) => { let _ = cache.grid(gc); },
                    Op::Install(gc) => {
                        cache.install(grid(gc, 0)).expect("install");
                        prop_assert!(cache.grid(gc).is_ok());
                        prop_assert!(cache.pending(gc).is_none());
                    },
                    Op::Trim(ul, lr) => {
                        let before: Vec<Coord> = cache.store.lock().grids.keys().copied().collect();
                        cache.trim(ul, lr);
                        for gc in before {
                            prop_assert_eq!(cache.is_cached(gc), gc.within(ul, lr));
                        }
                        let store = cache.store.lock();
                        prop_assert!(store.requests.coords().all(|gc| gc.within(ul, lr)));
                    },
                    Op::TrimAll => cache.trim_all(),
                    Op::Tick(ms) => {
                        now += Duration::from_millis(ms);
                        cache.send_requests_at(now);
                    },
                }
                assert_exclusive(&cache);
            }
        }
    }
}
