//! Public API for the simulation.
//!
//! [`SimWorld`] is the simulation context a client owns: it wraps one
//! [`EntityManager`] and drives it at a fixed timestep. Instances are fully
//! independent; nothing is global.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed. This keeps behaviour identical regardless of frame rate.
//! One call runs at most [`MAX_TICKS_PER_STEP`] updates; time beyond that is
//! dropped rather than replayed.

use crate::commands::Command;
use crate::config::SimConfig;
use crate::definitions::DefinitionStore;
use crate::error::{SimError, SpawnError};
use crate::manager::{EntityManager, SpawnConfig};
use crate::world::Snapshot;
use bevy_ecs::entity::Entity;
use tracing::{info, warn};

/// Upper bound on fixed updates run by a single [`SimWorld::step`] call.
pub const MAX_TICKS_PER_STEP: usize = 8;

/// The main simulation container.
pub struct SimWorld {
    manager: EntityManager,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    /// Whether ticks run from `step` are authoritative.
    authoritative: bool,
}

impl SimWorld {
    pub fn new(config: SimConfig, definitions: DefinitionStore) -> Result<Self, SimError> {
        info!(
            map_width = config.map_width,
            map_height = config.map_height,
            definitions = definitions.len(),
            "simulation created"
        );
        Ok(Self {
            manager: EntityManager::new(config, definitions)?,
            time_accumulator: 0.0,
            authoritative: true,
        })
    }

    /// Default config with the built-in definition catalog.
    pub fn with_builtin_definitions() -> Result<Self, SimError> {
        Self::new(SimConfig::default(), DefinitionStore::builtin()?)
    }

    /// Build from a JSON config document and a JSON definition array.
    pub fn from_json(config_json: &str, definitions_json: &str) -> Result<Self, SimError> {
        let config = SimConfig::from_json_str(config_json)?;
        let definitions = DefinitionStore::from_json_str(definitions_json)?;
        Self::new(config, definitions)
    }

    /// Mark ticks run by [`step`](Self::step) as authoritative or local.
    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.authoritative = authoritative;
    }

    /// Step the simulation forward by `dt` seconds. Returns the number of
    /// fixed updates run.
    pub fn step(&mut self, dt: f32) -> usize {
        let fixed_dt = self.manager.config().fixed_timestep;
        self.time_accumulator += dt;

        let mut ticks = 0;
        while self.time_accumulator >= fixed_dt {
            if ticks == MAX_TICKS_PER_STEP {
                warn!(
                    dropped_ms = f64::from(self.time_accumulator) * 1000.0,
                    "simulation fell behind, dropping accumulated time"
                );
                self.time_accumulator %= fixed_dt;
                break;
            }
            self.manager.update(self.authoritative);
            self.time_accumulator -= fixed_dt;
            ticks += 1;
        }
        ticks
    }

    /// Run exactly one fixed update.
    pub fn tick(&mut self, authoritative: bool) {
        self.manager.update(authoritative);
    }

    pub fn spawn(&mut self, spawn: SpawnConfig) -> Result<Entity, SimError> {
        Ok(self.manager.add(spawn)?)
    }

    pub fn spawn_json(&mut self, json: &str) -> Result<Entity, SimError> {
        let spawn: SpawnConfig = serde_json::from_str(json).map_err(SpawnError::from)?;
        self.spawn(spawn)
    }

    pub fn remove_by_guid(&mut self, guid: &str) -> Result<(), SimError> {
        let entity = self
            .manager
            .by_guid(guid)
            .ok_or_else(|| SimError::UnknownGuid(guid.to_string()))?;
        self.manager.remove(entity)
    }

    pub fn dispatch(&mut self, command: &Command) -> Result<usize, SimError> {
        Ok(self.manager.dispatch(command)?)
    }

    pub fn dispatch_json(&mut self, json: &str) -> Result<usize, SimError> {
        let command = Command::from_json_str(json)?;
        self.dispatch(&command)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_manager(&self.manager)
    }

    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }

    pub fn current_tick(&self) -> u64 {
        self.manager.clock().tick
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut EntityManager {
        &mut self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notification;

    #[test]
    fn test_fixed_timestep_accumulates() {
        let mut sim = SimWorld::with_builtin_definitions().unwrap();
        assert_eq!(sim.step(0.02), 0);
        assert_eq!(sim.step(0.02), 1);
        assert_eq!(sim.step(0.1), 3);
        assert_eq!(sim.current_tick(), 4);
    }

    #[test]
    fn test_long_frame_is_capped() {
        let mut sim = SimWorld::with_builtin_definitions().unwrap();
        assert_eq!(sim.step(10.0), MAX_TICKS_PER_STEP);
        assert_eq!(sim.current_tick(), MAX_TICKS_PER_STEP as u64);

        // The excess is gone, not carried into the next frame.
        assert_eq!(sim.step(0.0), 0);
        assert_eq!(sim.current_tick(), MAX_TICKS_PER_STEP as u64);
    }

    #[test]
    fn test_json_round_trip_through_api() {
        let mut sim = SimWorld::from_json(
            r#"{ "map_width": 32, "map_height": 32 }"#,
            r#"[{ "id": "drone", "max_velocity": 50, "max_acceleration": 50 }]"#,
        )
        .unwrap();
        sim.spawn_json(r#"{ "type": "drone", "guid": "d1", "x": 100, "y": 100 }"#)
            .unwrap();
        assert!(matches!(
            sim.spawn_json(r#"{ "type": "drone" }"#),
            Err(SimError::Spawn(SpawnError::Parse(_)))
        ));

        let applied = sim
            .dispatch_json(r#"{ "type": "move", "waypoints": [{ "x": 300, "y": 100 }], "targets": ["d1"] }"#)
            .unwrap();
        assert_eq!(applied, 1);
        for _ in 0..300 {
            sim.tick(true);
        }
        let drone = sim.snapshot().entity("d1").cloned().unwrap();
        assert!((drone.x - 300.0).abs() < 5.0);

        let json: serde_json::Value = serde_json::from_str(&sim.snapshot_json().unwrap()).unwrap();
        assert_eq!(json["tick"], 300);
        assert_eq!(json["entities"][0]["guid"], "d1");

        sim.remove_by_guid("d1").unwrap();
        assert!(matches!(sim.remove_by_guid("d1"), Err(SimError::UnknownGuid(_))));
        assert!(sim
            .manager_mut()
            .drain_notifications()
            .contains(&Notification::EntityCountChanged { count: 0 }));
    }
}
