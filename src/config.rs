//! Simulation configuration and the shared tick clock.

use crate::error::ConfigError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for a simulation instance.
///
/// Every field has a default, so a JSON document only needs to name the
/// values it overrides.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Player id of the local user; drives the `User*` selectors.
    pub local_player: u8,
    /// Map width in tiles.
    pub map_width: usize,
    /// Map height in tiles.
    pub map_height: usize,
    /// Size of one map tile in world units.
    pub tile_size: f32,
    /// Entries a quadtree node holds before it splits.
    pub quadtree_max_objects: usize,
    /// Maximum quadtree depth.
    pub quadtree_max_levels: usize,
    /// Length of one mining animation in simulated milliseconds.
    pub mine_duration_ms: f64,
    /// Distance at which a miner counts as arrived at a resource or station.
    pub mine_min_range: f32,
    /// Definition id of the entity type that accepts mined resources.
    pub mining_station_id: String,
    /// Distance a follower tries to keep from its target.
    pub follow_distance: f32,
    /// Distance at which an entity can dock into its host.
    pub dock_range: f32,
    /// Radius around the host on which undocked entities are placed.
    pub undock_radius: f32,
    /// A move whose requested destination is closer than this to a new one
    /// is not re-issued.
    pub arrival_tolerance: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            local_player: 1,
            map_width: 64,
            map_height: 64,
            tile_size: 40.0,
            quadtree_max_objects: 10,
            quadtree_max_levels: 5,
            mine_duration_ms: 5000.0,
            mine_min_range: 50.0,
            mining_station_id: "miningstation".to_string(),
            follow_distance: 80.0,
            dock_range: 50.0,
            undock_radius: 60.0,
            arrival_tolerance: 4.0,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if self.map_width == 0 || self.map_height == 0 {
            return Err(ConfigError::Invalid("map dimensions must be non-zero".into()));
        }
        if !(self.tile_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tile_size must be positive, got {}",
                self.tile_size
            )));
        }
        if self.quadtree_max_objects == 0 {
            return Err(ConfigError::Invalid("quadtree_max_objects must be non-zero".into()));
        }
        if self.mining_station_id.is_empty() {
            return Err(ConfigError::Invalid("mining_station_id must not be empty".into()));
        }
        Ok(())
    }

    /// World-space extent of the map `(width, height)`.
    pub fn world_extent(&self) -> (f32, f32) {
        (
            self.map_width as f32 * self.tile_size,
            self.map_height as f32 * self.tile_size,
        )
    }

    /// Fixed timestep in milliseconds.
    pub fn timestep_ms(&self) -> f64 {
        f64::from(self.fixed_timestep) * 1000.0
    }
}

/// Tick counter and simulated time, advanced once per fixed update.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimClock {
    pub tick: u64,
    /// Simulated milliseconds since the simulation started.
    pub elapsed_ms: f64,
    /// Delta time of the current tick in seconds.
    pub dt: f32,
    /// Whether the current tick may mutate gameplay state.
    pub authoritative: bool,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32, authoritative: bool) {
        self.tick = self.tick.wrapping_add(1);
        self.elapsed_ms += f64::from(dt) * 1000.0;
        self.dt = dt;
        self.authoritative = authoritative;
    }

    pub fn dt_ms(&self) -> f64 {
        f64::from(self.dt) * 1000.0
    }
}
