//! Static entity definitions.
//!
//! A definition describes one entity type (vision, weapon, footprint,
//! kinematic limits, abilities). Definitions are loaded once from JSON into a
//! [`DefinitionStore`] and shared read-only between every instance of the type.

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Commands an entity type is able to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Move,
    Stop,
    Patrol,
    Attack,
    Follow,
    Mine,
    Dock,
    Undock,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponDefinition {
    pub range: f32,
    pub damage: f32,
    /// Delay between two shots in milliseconds.
    pub cooldown_ms: f64,
}

impl Default for WeaponDefinition {
    fn default() -> Self {
        Self {
            range: 150.0,
            damage: 10.0,
            cooldown_ms: 1000.0,
        }
    }
}

/// Bounding size of an entity in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Footprint {
    pub width: f32,
    pub height: f32,
}

impl Default for Footprint {
    fn default() -> Self {
        Self {
            width: 32.0,
            height: 32.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityDefinition {
    /// Type id, unique within a store.
    pub id: String,
    pub vision_range: f32,
    pub weapon: Option<WeaponDefinition>,
    pub footprint: Footprint,
    /// Maximum hull points.
    pub hull: f32,
    /// World units per second.
    pub max_velocity: f32,
    /// World units per second squared.
    pub max_acceleration: f32,
    /// Radians per second.
    pub max_angular_velocity: f32,
    /// Number of discrete headings the entity is drawn with.
    pub angle_count: u16,
    pub levitates: bool,
    pub building: bool,
    pub resource: bool,
    /// Whether hostile entities may pick this type as a target.
    pub targetable: bool,
    /// Number of entities that may dock inside this type.
    pub dock_capacity: usize,
    pub abilities: Vec<Ability>,
}

impl Default for EntityDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            vision_range: 200.0,
            weapon: None,
            footprint: Footprint::default(),
            hull: 100.0,
            max_velocity: 0.0,
            max_acceleration: 0.0,
            max_angular_velocity: std::f32::consts::PI,
            angle_count: 16,
            levitates: false,
            building: false,
            resource: false,
            targetable: true,
            dock_capacity: 0,
            abilities: Vec::new(),
        }
    }
}

impl EntityDefinition {
    pub fn weapon_range(&self) -> f32 {
        self.weapon.map_or(0.0, |w| w.range)
    }

    pub fn has_weapon(&self) -> bool {
        self.weapon.is_some()
    }

    pub fn can_move(&self) -> bool {
        self.max_velocity > 0.0 && self.max_acceleration > 0.0
    }

    pub fn has_ability(&self, ability: Ability) -> bool {
        self.abilities.contains(&ability)
    }

    /// Braking distance from full speed, `v² / 2a`.
    pub fn max_drag_threshold(&self) -> f32 {
        if self.max_acceleration > 0.0 {
            self.max_velocity * self.max_velocity / (2.0 * self.max_acceleration)
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        let invalid = |reason: &str| DefinitionError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.vision_range < 0.0 || self.weapon_range() < 0.0 {
            return Err(invalid("ranges must not be negative"));
        }
        if self.max_velocity < 0.0 || self.max_acceleration < 0.0 || self.max_angular_velocity < 0.0 {
            return Err(invalid("kinematic limits must not be negative"));
        }
        if !(self.hull > 0.0) {
            return Err(invalid("hull must be positive"));
        }
        Ok(())
    }
}

/// Read-only lookup of entity definitions by type id.
#[derive(Debug, Clone, Default)]
pub struct DefinitionStore {
    definitions: HashMap<String, Arc<EntityDefinition>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of definitions.
    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        let definitions: Vec<EntityDefinition> = serde_json::from_str(json)?;
        let mut store = Self::new();
        for definition in definitions {
            store.register(definition)?;
        }
        Ok(store)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn register(&mut self, definition: EntityDefinition) -> Result<(), DefinitionError> {
        definition.validate()?;
        if self.definitions.contains_key(&definition.id) {
            return Err(DefinitionError::Duplicate(definition.id));
        }
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<EntityDefinition>> {
        self.definitions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Registered type ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// The stock catalog used by the demo and benchmarks.
    pub fn builtin() -> Result<Self, DefinitionError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }
}

/// Stock entity types: a mining station, a mineable asteroid, a harvester,
/// a fighter and a carrier that fighters dock into.
pub const BUILTIN_CATALOG: &str = r#"[
    {
        "id": "miningstation",
        "vision_range": 300.0,
        "footprint": { "width": 96.0, "height": 96.0 },
        "hull": 2000.0,
        "building": true,
        "dock_capacity": 4,
        "abilities": ["undock"]
    },
    {
        "id": "asteroid",
        "vision_range": 400.0,
        "footprint": { "width": 48.0, "height": 48.0 },
        "hull": 500.0,
        "resource": true,
        "targetable": false
    },
    {
        "id": "harvester",
        "vision_range": 250.0,
        "hull": 150.0,
        "max_velocity": 60.0,
        "max_acceleration": 60.0,
        "abilities": ["move", "stop", "patrol", "follow", "mine", "dock"]
    },
    {
        "id": "fighter",
        "vision_range": 300.0,
        "weapon": { "range": 150.0, "damage": 12.0, "cooldown_ms": 800.0 },
        "footprint": { "width": 24.0, "height": 24.0 },
        "hull": 80.0,
        "max_velocity": 120.0,
        "max_acceleration": 90.0,
        "max_angular_velocity": 4.0,
        "levitates": true,
        "abilities": ["move", "stop", "patrol", "attack", "follow", "dock"]
    },
    {
        "id": "carrier",
        "vision_range": 350.0,
        "weapon": { "range": 200.0, "damage": 20.0, "cooldown_ms": 1500.0 },
        "footprint": { "width": 80.0, "height": 80.0 },
        "hull": 1200.0,
        "max_velocity": 40.0,
        "max_acceleration": 20.0,
        "max_angular_velocity": 1.0,
        "dock_capacity": 6,
        "abilities": ["move", "stop", "patrol", "attack", "follow", "undock"]
    }
]"#;
