//! ECS Components for the fleet simulation.
//!
//! Components are plain data attached to entities. Behaviour lives in the
//! systems, the motion pipeline and the activity machines that read them.
//! `Motion` and `ActivityQueue` are defined next to the code that drives them.

use crate::activity::ActivityQueue;
use crate::definitions::EntityDefinition;
use crate::motion::Motion;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// World-space position of an entity's centre.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Bearing from `self` towards `other` in radians.
    pub fn angle_to(&self, other: &Position) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Point at `distance` from `self` along `angle`.
    pub fn offset(&self, angle: f32, distance: f32) -> Position {
        Position::new(self.x + angle.cos() * distance, self.y + angle.sin() * distance)
    }
}

/// Map cell an entity currently marks in the collision map.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupiedTile(pub Option<(i32, i32)>);

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Externally visible unique id, used by commands and spawn configs.
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guid(pub String);

impl Guid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Owning player / team.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team(pub u8);

impl Default for Team {
    fn default() -> Self {
        Team(1)
    }
}

/// Shared handle to the entity's static definition.
#[derive(Component, Debug, Clone)]
pub struct Definition(pub Arc<EntityDefinition>);

impl Deref for Definition {
    type Target = EntityDefinition;

    fn deref(&self) -> &EntityDefinition {
        &self.0
    }
}

// ============================================================================
// STATE MARKERS
// ============================================================================

/// Inactive entity: docked, or destroyed and waiting for the sweep.
/// Hibernated entities are skipped by the grid, the spatial index,
/// proximity resolution and targeting.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Hibernated;

/// Entity is part of the local player's selection.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Selected;

/// Entity ignores user commands issued through the `User*` selectors.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NoUserControl;

/// Entity is docked inside `host`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Docked {
    pub host: Entity,
}

/// Entities currently docked inside this one, in docking order.
#[derive(Component, Debug, Clone, Default)]
pub struct DockedEntities(pub Vec<Entity>);

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Structural integrity. An entity whose hull reaches zero is destroyed on the
/// next authoritative sweep.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hull {
    pub current: f32,
    pub max: f32,
}

impl Hull {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_intact(&self) -> bool {
        self.current > 0.0
    }

    pub fn fraction(&self) -> f32 {
        if self.max > 0.0 {
            self.current / self.max
        } else {
            0.0
        }
    }

    pub fn apply_damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

/// Remaining weapon cooldown in simulated milliseconds.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct WeaponState {
    pub cooldown_ms: f64,
}

impl WeaponState {
    pub fn is_ready(&self) -> bool {
        self.cooldown_ms <= 0.0
    }

    pub fn cool_down(&mut self, elapsed_ms: f64) {
        self.cooldown_ms = (self.cooldown_ms - elapsed_ms).max(0.0);
    }

    pub fn trigger(&mut self, cooldown_ms: f64) {
        self.cooldown_ms = cooldown_ms;
    }
}

// ============================================================================
// PROXIMITY COMPONENTS
// ============================================================================

/// One entity found near another during proximity resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub entity: Entity,
    pub distance: f32,
    /// Within the observer's vision range.
    pub in_vision: bool,
    /// Within the observer's weapon range.
    pub in_range: bool,
}

/// Proximity results cached for one tick.
///
/// Candidates are ordered by ascending distance, ties by lowest entity id.
#[derive(Component, Debug, Clone, Default)]
pub struct Proximity {
    pub candidates: Vec<Candidate>,
    pub closest_hostile_in_range: Option<Entity>,
    pub closest_hostile_in_vision: Option<Entity>,
    /// Same-team neighbours in distance order.
    pub allies: Vec<Entity>,
}

impl Proximity {
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.closest_hostile_in_range = None;
        self.closest_hostile_in_vision = None;
        self.allies.clear();
    }

    pub fn candidate(&self, entity: Entity) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.entity == entity)
    }

    pub fn in_range(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.in_range)
    }

    pub fn in_vision(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.in_vision)
    }
}

// ============================================================================
// BUNDLES
// ============================================================================

/// Everything a freshly spawned entity carries.
#[derive(Bundle)]
pub struct EntityBundle {
    pub guid: Guid,
    pub team: Team,
    pub position: Position,
    pub definition: Definition,
    pub motion: Motion,
    pub activities: ActivityQueue,
    pub proximity: Proximity,
    pub tile: OccupiedTile,
    pub hull: Hull,
    pub weapon: WeaponState,
}

impl EntityBundle {
    pub fn new(guid: String, team: u8, position: Position, definition: Arc<EntityDefinition>) -> Self {
        Self {
            guid: Guid(guid),
            team: Team(team),
            position,
            motion: Motion::from_definition(&definition),
            activities: ActivityQueue::default(),
            proximity: Proximity::default(),
            tile: OccupiedTile::default(),
            hull: Hull::new(definition.hull),
            weapon: WeaponState::default(),
            definition: Definition(definition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_geometry() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);

        let east = a.offset(a.angle_to(&Position::new(10.0, 0.0)), 7.0);
        assert!((east.x - 7.0).abs() < 1e-5);
        assert!(east.y.abs() < 1e-5);
    }

    #[test]
    fn test_hull_damage_clamps() {
        let mut hull = Hull::new(50.0);
        hull.apply_damage(20.0);
        assert!(hull.is_intact());
        assert!((hull.fraction() - 0.6).abs() < 1e-5);
        hull.apply_damage(100.0);
        assert_eq!(hull.current, 0.0);
        assert!(!hull.is_intact());
    }

    #[test]
    fn test_weapon_cooldown() {
        let mut weapon = WeaponState::default();
        assert!(weapon.is_ready());
        weapon.trigger(100.0);
        weapon.cool_down(60.0);
        assert!(!weapon.is_ready());
        weapon.cool_down(60.0);
        assert!(weapon.is_ready());
    }
}
