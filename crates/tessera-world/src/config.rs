//! Map cache configuration.
//!
//! Holds the grid geometry and the timing constants of the request and
//! reassembly machinery. Configuration can be loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tessera_common::Coord;
use tracing::{info, warn};

/// Default grid extent in tiles.
pub const DEFAULT_GRID_EXTENT: Coord = Coord::new(100, 100);

/// Default tile size in world units.
pub const DEFAULT_TILE_SIZE: Coord = Coord::new(11, 11);

/// Default minimum time between two requests for the same grid.
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 1000;

/// Default number of requests sent for a grid before giving up.
pub const DEFAULT_MAX_REQUEST_ATTEMPTS: u32 = 5;

/// Default idle time after which a partial fragment buffer is dropped.
pub const DEFAULT_FRAGMENT_TIMEOUT_MS: u64 = 10_000;

/// Map cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Size of one grid in tiles
    pub grid_extent: Coord,
    /// Size of one tile in world units
    pub tile_size: Coord,
    /// Minimum time between two requests for the same grid
    pub request_interval_ms: u64,
    /// Requests sent for a grid before the request is dropped
    pub max_request_attempts: u32,
    /// Idle time after which a partial fragment buffer is dropped
    pub fragment_timeout_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            grid_extent: DEFAULT_GRID_EXTENT,
            tile_size: DEFAULT_TILE_SIZE,
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            max_request_attempts: DEFAULT_MAX_REQUEST_ATTEMPTS,
            fragment_timeout_ms: DEFAULT_FRAGMENT_TIMEOUT_MS,
        }
    }
}

impl MapConfig {
    /// Request interval as a duration.
    #[must_use]
    pub const fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Fragment idle timeout as a duration.
    #[must_use]
    pub const fn fragment_timeout(&self) -> Duration {
        Duration::from_millis(self.fragment_timeout_ms)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Serializes the configuration to TOML text.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a specific path.
    /// Returns default config if the file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Map config {} not found, using defaults", path.display());
            return Self::default();
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read map config {}: {e}", path.display());
                return Self::default();
            },
        };

        match Self::from_toml_str(&text) {
            Ok(config) if config.is_valid() => {
                info!("Loaded map config from {}", path.display());
                config
            },
            Ok(_) => {
                warn!("Map config {} has a non-positive grid extent, using defaults", path.display());
                Self::default()
            },
            Err(e) => {
                warn!("Failed to parse map config {}: {e}", path.display());
                Self::default()
            },
        }
    }

    /// Returns true if the grid extent can address tiles.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.grid_extent.x > 0 && self.grid_extent.y > 0
    }
}
