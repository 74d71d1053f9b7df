//! Seam to the external resource loader.
//!
//! The cache never loads assets itself. It asks a [`ResourceLoader`] for a
//! handle by name and version and polls that handle until it has finished
//! loading.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::tileset::Tileset;

/// Handle to a named, versioned resource that may still be loading.
pub trait TileResource: Send + Sync + fmt::Debug {
    /// Resource name.
    fn name(&self) -> &str;

    /// Resource version.
    fn version(&self) -> u16;

    /// Returns true while the resource is still being fetched.
    fn is_loading(&self) -> bool;

    /// Tile-set layer of a loaded resource, if it has one.
    fn tileset(&self) -> Option<Tileset>;
}

/// Source of resource handles.
pub trait ResourceLoader: Send + Sync {
    /// Starts (or joins) loading `name` at `version` and returns its handle.
    fn load(&self, name: &str, version: u16) -> Arc<dyn TileResource>;
}

/// Resource whose content is known up front.
///
/// Useful for hosts that ship tile-sets with the client and for tests. The
/// loading flag can be flipped to simulate a resource arriving late.
#[derive(Debug)]
pub struct StaticResource {
    name: String,
    version: u16,
    loading: AtomicBool,
    tileset: Option<Tileset>,
}

impl StaticResource {
    /// Creates a loaded resource.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u16, tileset: Option<Tileset>) -> Self {
        Self {
            name: name.into(),
            version,
            loading: AtomicBool::new(false),
            tileset,
        }
    }

    /// Creates a resource that reports itself as loading until
    /// [`finish_loading`](Self::finish_loading) is called.
    #[must_use]
    pub fn loading(name: impl Into<String>, version: u16, tileset: Option<Tileset>) -> Self {
        let res = Self::new(name, version, tileset);
        res.loading.store(true, Ordering::Release);
        res
    }

    /// Marks the resource as loaded.
    pub fn finish_loading(&self) {
        self.loading.store(false, Ordering::Release);
    }
}

impl TileResource for StaticResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    fn tileset(&self) -> Option<Tileset> {
        self.tileset.clone()
    }
}
