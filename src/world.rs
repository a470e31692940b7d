//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the simulation state
//! for external consumers (renderers, UI counters, replays).

use crate::activity::ActivityQueue;
use crate::components::*;
use crate::manager::EntityManager;
use crate::motion::Motion;
use serde::{Deserialize, Serialize};

/// Snapshot of a single entity's state for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub guid: String,
    pub type_id: String,
    pub team: u8,
    pub x: f32,
    pub y: f32,
    /// Heading in radians.
    pub heading: f32,
    pub velocity: f32,
    pub hull: f32,
    pub hull_max: f32,
    pub hibernated: bool,
    pub selected: bool,
    /// GUID of the host this entity is docked in.
    pub docked_on: Option<String>,
    pub activity: Option<String>,
    pub activity_state: Option<String>,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in milliseconds.
    pub elapsed_ms: f64,
    /// All entities, in id order.
    pub entities: Vec<EntitySnapshot>,
    /// Number of occupied grid cells.
    pub occupied_tiles: usize,
}

impl Snapshot {
    pub fn from_manager(manager: &EntityManager) -> Self {
        let world = manager.world();
        let guid_of = |entity| world.get::<Guid>(entity).map(|g| g.0.clone());

        let entities = manager
            .entities(&crate::manager::Selector::All)
            .into_iter()
            .filter_map(|entity| {
                let view = manager.view(entity)?;
                let hull = world.get::<Hull>(entity).copied().unwrap_or(Hull::new(0.0));
                let motion = world.get::<Motion>(entity);
                let current = world.get::<ActivityQueue>(entity).and_then(ActivityQueue::current);
                Some(EntitySnapshot {
                    guid: view.guid.to_string(),
                    type_id: view.definition.id.clone(),
                    team: view.team.0,
                    x: view.position.x,
                    y: view.position.y,
                    heading: motion.map_or(0.0, Motion::heading),
                    velocity: motion.map_or(0.0, Motion::velocity),
                    hull: hull.current,
                    hull_max: hull.max,
                    hibernated: view.hibernated,
                    selected: view.selected,
                    docked_on: view.docked_on.and_then(guid_of),
                    activity: current.map(|a| a.name().to_string()),
                    activity_state: current.map(|a| a.state_name().to_string()),
                })
            })
            .collect();

        let clock = manager.clock();
        Self {
            tick: clock.tick,
            elapsed_ms: clock.elapsed_ms,
            entities,
            occupied_tiles: manager.collision_map().occupied_count(),
        }
    }

    pub fn entity(&self, guid: &str) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.guid == guid)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON (for debugging).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
