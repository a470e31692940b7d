//! Entity manager - owns the world, runs the tick and answers selectors.
//!
//! The manager is the only thing that mutates the occupancy grid, the spatial
//! index and the entity set. Everything else reads them through accessors or
//! goes through [`EntityManager::add`], [`EntityManager::remove`],
//! [`EntityManager::issue`] and command dispatch.

use crate::activity::{self, dock, Activity, ActivityQueue};
use crate::collision::{collision_update_system, CollisionMap};
use crate::components::*;
use crate::config::{SimClock, SimConfig};
use crate::definitions::{Ability, DefinitionStore, EntityDefinition};
use crate::error::{ConfigError, SimError, SpawnError};
use crate::events::{ListenerHandle, Notification, Notifications, RemovalSubscriptions};
use crate::motion::Motion;
use crate::pathfinding::{pathfinding_sync_system, PathfindingGrid};
use crate::spatial::{spatial_index_update_system, QuadTree, Rect};
use crate::systems::*;
use bevy_ecs::prelude::*;
use bevy_ecs::world::EntityRef;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn default_team() -> u8 {
    1
}

/// Everything needed to create one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Registered definition id.
    #[serde(rename = "type")]
    pub type_id: String,
    pub guid: String,
    #[serde(default = "default_team")]
    pub team: u8,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// GUID of a host to spawn docked inside.
    #[serde(default)]
    pub home_station: Option<String>,
    #[serde(default)]
    pub no_user_control: bool,
}

impl SpawnConfig {
    pub fn new(type_id: impl Into<String>, guid: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            type_id: type_id.into(),
            guid: guid.into(),
            team: default_team(),
            x,
            y,
            home_station: None,
            no_user_control: false,
        }
    }

    pub fn team(mut self, team: u8) -> Self {
        self.team = team;
        self
    }

    pub fn docked_in(mut self, host_guid: impl Into<String>) -> Self {
        self.home_station = Some(host_guid.into());
        self
    }

    pub fn without_user_control(mut self) -> Self {
        self.no_user_control = true;
        self
    }
}

/// Read-only view of one entity, handed to selectors and predicates.
#[derive(Debug, Clone, Copy)]
pub struct EntityView<'a> {
    pub entity: Entity,
    pub guid: &'a str,
    pub team: Team,
    pub position: Position,
    pub definition: &'a EntityDefinition,
    pub hibernated: bool,
    pub selected: bool,
    pub user_controllable: bool,
    pub docked_on: Option<Entity>,
}

impl<'a> EntityView<'a> {
    fn from_ref(entity: EntityRef<'a>) -> Option<Self> {
        let guid = entity.get::<Guid>()?;
        let definition = entity.get::<Definition>()?;
        Some(Self {
            entity: entity.id(),
            guid: guid.as_str(),
            team: entity.get::<Team>().copied().unwrap_or_default(),
            position: entity.get::<Position>().copied().unwrap_or_default(),
            definition: &definition.0,
            hibernated: entity.contains::<Hibernated>(),
            selected: entity.contains::<Selected>(),
            user_controllable: !entity.contains::<NoUserControl>(),
            docked_on: entity.get::<Docked>().map(|d| d.host),
        })
    }
}

/// Fixed vocabulary of entity filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    NotHibernated,
    Selected,
    /// Owned by the local player.
    User,
    /// Owned by the local player, selected and user-controllable.
    UserSelected,
    /// `UserSelected` without buildings.
    UserSelectedUnits,
    Player(u8),
    Guid(String),
    Entity(Entity),
}

impl Selector {
    pub fn matches(&self, view: &EntityView<'_>, local_player: u8) -> bool {
        let user_selected =
            || view.team.0 == local_player && view.selected && view.user_controllable;
        match self {
            Selector::All => true,
            Selector::NotHibernated => !view.hibernated,
            Selector::Selected => view.selected,
            Selector::User => view.team.0 == local_player,
            Selector::UserSelected => user_selected(),
            Selector::UserSelectedUnits => user_selected() && !view.definition.building,
            Selector::Player(player) => view.team.0 == *player,
            Selector::Guid(guid) => view.guid == guid,
            Selector::Entity(entity) => view.entity == *entity,
        }
    }
}

/// Owner of the simulated entity set and the per-tick pipeline.
pub struct EntityManager {
    world: World,
    update_schedule: Schedule,
    /// Spatial index + proximity only, run after out-of-tick removals.
    refresh_schedule: Schedule,
    definitions: DefinitionStore,
}

impl EntityManager {
    pub fn new(config: SimConfig, definitions: DefinitionStore) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = World::new();
        let (extent_w, extent_h) = config.world_extent();
        world.insert_resource(QuadTree::new(
            Rect::new(0.0, 0.0, extent_w, extent_h),
            config.quadtree_max_objects,
            config.quadtree_max_levels,
        ));
        world.insert_resource(CollisionMap::new(config.map_width, config.map_height, config.tile_size));
        world.insert_resource(PathfindingGrid::default());
        world.insert_resource(Notifications::default());
        world.insert_resource(RemovalSubscriptions::default());
        world.insert_resource(SimClock::default());
        world.insert_resource(config);

        let mut update_schedule = Schedule::default();
        update_schedule.add_systems(
            (
                collision_update_system,
                pathfinding_sync_system,
                spatial_index_update_system,
                proximity_system,
                activity_system,
                motion_system,
                combat_system,
                destruction_sweep_system,
            )
                .chain(),
        );

        let mut refresh_schedule = Schedule::default();
        refresh_schedule.add_systems((spatial_index_update_system, proximity_system).chain());

        Ok(Self {
            world,
            update_schedule,
            refresh_schedule,
            definitions,
        })
    }

    /// Run one fixed-timestep tick.
    ///
    /// Non-authoritative ticks still move entities and advance activities
    /// locally, but deal no damage and remove nothing. Only weapon fire and
    /// the destruction sweep are gated, so a speculative run keeps the same
    /// activity states and subscriptions as the authoritative one it predicts.
    pub fn update(&mut self, authoritative: bool) {
        let dt = self.world.resource::<SimConfig>().fixed_timestep;
        self.world.resource_mut::<SimClock>().advance(dt, authoritative);
        self.update_schedule.run(&mut self.world);
    }

    /// Create an entity from a spawn config. Nothing is created on error.
    pub fn add(&mut self, spawn: SpawnConfig) -> Result<Entity, SpawnError> {
        let definition = self
            .definitions
            .get(&spawn.type_id)
            .ok_or_else(|| SpawnError::UnregisteredType(spawn.type_id.clone()))?;
        if spawn.guid.is_empty() {
            return Err(SpawnError::MissingGuid);
        }
        if self.by_guid(&spawn.guid).is_some() {
            return Err(SpawnError::DuplicateGuid(spawn.guid));
        }

        let host = match &spawn.home_station {
            Some(host_guid) => {
                let host = self
                    .by_guid(host_guid)
                    .ok_or_else(|| SpawnError::UnknownHomeStation(host_guid.clone()))?;
                let capacity = self.world.get::<Definition>(host).map_or(0, |d| d.dock_capacity);
                let docked = self.world.get::<DockedEntities>(host).map_or(0, |d| d.0.len());
                if docked >= capacity {
                    return Err(SpawnError::HomeStationFull(host_guid.clone()));
                }
                Some(host)
            }
            None => None,
        };

        let position = Position::new(spawn.x, spawn.y);
        let mut spawned = self
            .world
            .spawn(EntityBundle::new(spawn.guid.clone(), spawn.team, position, definition));
        if spawn.no_user_control {
            spawned.insert(NoUserControl);
        }
        let entity = spawned.id();

        if let Some(host) = host {
            dock::dock_entity(&mut self.world, entity, host);
        }

        info!(guid = %spawn.guid, type_id = %spawn.type_id, team = spawn.team, ?entity, "entity spawned");
        self.emit_count();
        Ok(entity)
    }

    /// Remove an entity and everything docked inside it.
    pub fn remove(&mut self, entity: Entity) -> Result<(), SimError> {
        if self.world.get::<Guid>(entity).is_none() {
            return Err(SimError::UnknownEntity(entity));
        }
        let config = self.config().clone();
        despawn_cascade(&mut self.world, &config, entity);
        self.refresh_schedule.run(&mut self.world);
        self.emit_count();
        Ok(())
    }

    /// Remove every entity.
    pub fn reset(&mut self) {
        let config = self.config().clone();
        for entity in self.entities(&Selector::All) {
            despawn_cascade(&mut self.world, &config, entity);
        }
        self.world.resource_mut::<RemovalSubscriptions>().clear();
        self.refresh_schedule.run(&mut self.world);
        self.emit_count();
        info!("entity manager reset");
    }

    fn emit_count(&mut self) {
        let count = self.count();
        self.world
            .resource_mut::<Notifications>()
            .emit(Notification::EntityCountChanged { count });
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Entities matching `selector`, in id order.
    pub fn entities(&self, selector: &Selector) -> Vec<Entity> {
        let local_player = self.config().local_player;
        self.entities_where(|view| selector.matches(view, local_player))
    }

    /// Entities for which `predicate` holds, in id order.
    pub fn entities_where(&self, mut predicate: impl FnMut(&EntityView<'_>) -> bool) -> Vec<Entity> {
        let mut found: Vec<Entity> = self
            .world
            .iter_entities()
            .filter_map(EntityView::from_ref)
            .filter(|view| predicate(view))
            .map(|view| view.entity)
            .collect();
        found.sort();
        found
    }

    pub fn view(&self, entity: Entity) -> Option<EntityView<'_>> {
        if !self.world.entities().contains(entity) {
            return None;
        }
        EntityView::from_ref(self.world.entity(entity))
    }

    pub fn by_guid(&self, guid: &str) -> Option<Entity> {
        self.world
            .iter_entities()
            .find(|e| e.get::<Guid>().is_some_and(|g| g.as_str() == guid))
            .map(|e| e.id())
    }

    pub fn count(&self) -> usize {
        self.world
            .iter_entities()
            .filter(|e| e.contains::<Guid>())
            .count()
    }

    pub fn select(&mut self, entity: Entity) -> bool {
        if self.world.get::<Guid>(entity).is_none() {
            return false;
        }
        self.world.entity_mut(entity).insert(Selected);
        true
    }

    /// Clear the selection, keeping `except` selected if given.
    pub fn unselect_all(&mut self, except: Option<Entity>) {
        for entity in self.entities(&Selector::Selected) {
            if Some(entity) != except {
                self.world.entity_mut(entity).remove::<Selected>();
            }
        }
    }

    /// Abilities shared by every entity in `entities`, in the first entity's
    /// order.
    pub fn merged_abilities(&self, entities: &[Entity]) -> Vec<Ability> {
        let definitions: Vec<&EntityDefinition> = entities
            .iter()
            .filter_map(|&e| self.world.get::<Definition>(e))
            .map(|d| &*d.0)
            .collect();
        let Some((first, rest)) = definitions.split_first() else {
            return Vec::new();
        };
        first
            .abilities
            .iter()
            .copied()
            .filter(|ability| rest.iter().all(|d| d.has_ability(*ability)))
            .collect()
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Install `activity` on `entity`, replacing the current one unless
    /// `add_as_last` is set and the entity is busy.
    pub fn issue(&mut self, entity: Entity, activity: Activity, add_as_last: bool) -> Result<(), SimError> {
        if self.world.get::<ActivityQueue>(entity).is_none() {
            return Err(SimError::UnknownEntity(entity));
        }
        let config = self.config().clone();
        activity::install(&mut self.world, &config, entity, activity, add_as_last);
        Ok(())
    }

    /// Kill every activity of `entity` and brake.
    pub fn stop(&mut self, entity: Entity) -> Result<(), SimError> {
        if self.world.get::<ActivityQueue>(entity).is_none() {
            return Err(SimError::UnknownEntity(entity));
        }
        let config = self.config().clone();
        activity::clear(&mut self.world, &config, entity);
        if let Some(mut motion) = self.world.get_mut::<Motion>(entity) {
            if motion.is_moving() {
                motion.stop();
            }
        }
        Ok(())
    }

    /// Release everything docked in `host`.
    pub fn undock(&mut self, host: Entity) -> Vec<Entity> {
        let radius = self.config().undock_radius;
        let released = dock::undock_all(&mut self.world, host, radius);
        if !released.is_empty() {
            info!(?host, count = released.len(), "entities undocked");
        }
        released
    }

    /// Path between two world positions over unoccupied tiles, as tile
    /// centres.
    pub fn find_path(&self, from: Position, to: Position) -> Option<Vec<Position>> {
        let map = self.collision_map();
        let to_cell = |pos: &Position| {
            let (x, y) = map.tile_at(pos);
            Some((usize::try_from(x).ok()?, usize::try_from(y).ok()?))
        };
        let (start, goal) = (to_cell(&from)?, to_cell(&to)?);
        let size = map.tile_size();
        let path = self.pathfinding().find_path(start, goal);
        if path.is_none() {
            warn!(?start, ?goal, "no path");
        }
        Some(
            path?
                .into_iter()
                .map(|(x, y)| Position::new((x as f32 + 0.5) * size, (y as f32 + 0.5) * size))
                .collect(),
        )
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: FnMut(&Notification) + Send + Sync + 'static,
    {
        self.world.resource_mut::<Notifications>().subscribe(listener)
    }

    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        self.world.resource_mut::<Notifications>().unsubscribe(handle)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.world.resource_mut::<Notifications>().drain()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn world(&self) -> &World {
        &self.world
    }

    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    pub fn clock(&self) -> SimClock {
        *self.world.resource::<SimClock>()
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn collision_map(&self) -> &CollisionMap {
        self.world.resource::<CollisionMap>()
    }

    pub fn spatial_index(&self) -> &QuadTree {
        self.world.resource::<QuadTree>()
    }

    pub fn pathfinding(&self) -> &PathfindingGrid {
        self.world.resource::<PathfindingGrid>()
    }

    pub fn subscriptions(&self) -> &RemovalSubscriptions {
        self.world.resource::<RemovalSubscriptions>()
    }

    pub fn position(&self, entity: Entity) -> Option<Position> {
        self.world.get::<Position>(entity).copied()
    }

    pub fn proximity(&self, entity: Entity) -> Option<&Proximity> {
        self.world.get::<Proximity>(entity)
    }

    pub fn hull(&self, entity: Entity) -> Option<Hull> {
        self.world.get::<Hull>(entity).copied()
    }

    pub fn motion(&self, entity: Entity) -> Option<&Motion> {
        self.world.get::<Motion>(entity)
    }

    pub fn activities(&self, entity: Entity) -> Option<&ActivityQueue> {
        self.world.get::<ActivityQueue>(entity)
    }

    pub fn current_activity(&self, entity: Entity) -> Option<&Activity> {
        self.activities(entity)?.current()
    }

    pub fn docked_entities(&self, host: Entity) -> Vec<Entity> {
        self.world
            .get::<DockedEntities>(host)
            .map(|d| d.0.clone())
            .unwrap_or_default()
    }

    pub fn is_hibernated(&self, entity: Entity) -> bool {
        self.world.get::<Hibernated>(entity).is_some()
    }
}
