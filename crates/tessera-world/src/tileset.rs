//! Tile-set bindings by small integer id.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tessera_common::{NotReady, TilesetId};
use thiserror::Error;
use tracing::debug;

use crate::resource::{ResourceLoader, TileResource};

/// Tile-set resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilesetError {
    /// The bound resource is still loading
    #[error(transparent)]
    NotReady(#[from] NotReady),

    /// No mapping was ever received for this id
    #[error("tile-set id {0:?} is not bound")]
    Unbound(TilesetId),

    /// The bound resource has no tile-set layer
    #[error("resource {name} has no tile-set layer")]
    MissingTileset {
        /// Resource name
        name: String,
    },
}

/// One weighted entry of a tile-set's decorative object pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorChoice {
    /// Resource drawn for the object
    pub resource: String,
    /// Relative pick weight
    pub weight: u32,
}

/// Tile-set view derived from a loaded resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tileset {
    /// Decorative object pool
    flavor_objects: Vec<FlavorChoice>,
    /// One tile in `flavor_prob` gets a decorative object
    flavor_prob: u32,
    /// Sum of the pool weights
    total_weight: u64,
}

impl Tileset {
    /// Creates a tile-set with the given decorative pool.
    #[must_use]
    pub fn new(flavor_prob: u32, flavor_objects: Vec<FlavorChoice>) -> Self {
        let total_weight = flavor_objects.iter().map(|c| u64::from(c.weight)).sum();
        Self {
            flavor_objects,
            flavor_prob,
            total_weight,
        }
    }

    /// Decorative object pool.
    #[must_use]
    pub fn flavor_objects(&self) -> &[FlavorChoice] {
        &self.flavor_objects
    }

    /// Selection probability denominator.
    #[must_use]
    pub const fn flavor_prob(&self) -> u32 {
        self.flavor_prob
    }

    /// Returns true if tiles of this set can carry decorative objects.
    #[must_use]
    pub const fn has_flavor(&self) -> bool {
        self.total_weight > 0 && self.flavor_prob > 0
    }

    /// Picks a pool entry with probability proportional to its weight.
    pub fn pick(&self, rng: &mut fastrand::Rng) -> Option<&FlavorChoice> {
        if self.total_weight == 0 {
            return None;
        }
        let mut roll = rng.u64(..self.total_weight);
        for choice in &self.flavor_objects {
            let w = u64::from(choice.weight);
            if roll < w {
                return Some(choice);
            }
            roll -= w;
        }
        None
    }
}

/// A resource bound to an id, plus its memoized tile-set view.
#[derive(Debug)]
pub struct TilesetBinding {
    resource: Arc<dyn TileResource>,
    derived: OnceLock<Arc<Tileset>>,
}

impl TilesetBinding {
    /// Bound resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<dyn TileResource> {
        &self.resource
    }

    fn resolve(&self) -> Result<Arc<Tileset>, TilesetError> {
        if let Some(set) = self.derived.get() {
            return Ok(Arc::clone(set));
        }
        if self.resource.is_loading() {
            return Err(NotReady.into());
        }
        let set = self
            .resource
            .tileset()
            .ok_or_else(|| TilesetError::MissingTileset {
                name: self.resource.name().to_owned(),
            })?;
        Ok(Arc::clone(self.derived.get_or_init(|| Arc::new(set))))
    }
}

/// Id to tile-set table for one session.
pub struct TilesetRegistry {
    loader: Arc<dyn ResourceLoader>,
    bindings: DashMap<TilesetId, Arc<TilesetBinding>>,
}

impl TilesetRegistry {
    /// Creates an empty registry backed by `loader`.
    #[must_use]
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            bindings: DashMap::new(),
        }
    }

    /// Binds `id` to a resource, dropping any tile-set derived from the
    /// previous binding.
    pub fn set_mapping(&self, id: TilesetId, name: &str, version: u16) {
        debug!("Binding tile-set {} to {name} v{version}", id.raw());
        let binding = TilesetBinding {
            resource: self.loader.load(name, version),
            derived: OnceLock::new(),
        };
        self.bindings.insert(id, Arc::new(binding));
    }

    /// Returns the binding for `id`.
    #[must_use]
    pub fn binding(&self, id: TilesetId) -> Option<Arc<TilesetBinding>> {
        self.bindings.get(&id).map(|b| Arc::clone(b.value()))
    }

    /// Resolves `id` to its tile-set, deriving and caching it on first use.
    pub fn resolve(&self, id: TilesetId) -> Result<Arc<Tileset>, TilesetError> {
        // Clone the binding out so no shard lock is held across the loader
        let binding = self.binding(id).ok_or(TilesetError::Unbound(id))?;
        binding.resolve()
    }

    /// Number of bound ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if no id is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Debug for TilesetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TilesetRegistry")
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}
