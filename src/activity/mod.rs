//! Per-entity behaviour machines.
//!
//! Every command installs an [`Activity`] on the issuing entity. Each tick the
//! current activity runs exactly one handler, the one mapped to its current
//! state; a transition made by that handler is seen on the next tick.
//!
//! Activities never hold their targets directly. They keep the target's
//! [`Entity`] id plus a [`SubscriptionHandle`] in the removal registry, and
//! `kill` gives every handle back.
//!
//! ## Lifecycle
//!
//! The current activity is taken out of its [`ActivityQueue`] while it runs
//! and put back afterwards, so a handler has the whole [`World`] to itself
//! through its [`ActivityContext`].

pub mod attack;
pub mod dock;
pub mod mine;
pub mod travel;

pub use attack::{AttackActivity, AttackState};
pub use dock::{DockActivity, DockState};
pub use mine::{MineActivity, MineState};
pub use travel::{FollowActivity, FollowState, MoveActivity, MoveState, PatrolActivity, PatrolState};

use crate::components::{
    Definition, DockedEntities, Guid, Hibernated, Hull, Position, Proximity, Team, WeaponState,
};
use crate::config::{SimClock, SimConfig};
use crate::definitions::EntityDefinition;
use crate::events::{RemovalSubscriptions, SubscriptionHandle};
use crate::motion::Motion;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    Running,
    Finished,
}

/// What a removal callback learns about the entity that went away.
#[derive(Debug, Clone)]
pub struct RemovedEntity {
    pub entity: Entity,
    /// The removed entity's allies as of its last proximity pass.
    pub allies: Vec<Entity>,
}

#[derive(Debug, Clone)]
pub enum Activity {
    Move(MoveActivity),
    Attack(AttackActivity),
    Follow(FollowActivity),
    Patrol(PatrolActivity),
    Mine(MineActivity),
    Dock(DockActivity),
}

impl Activity {
    pub fn name(&self) -> &'static str {
        match self {
            Activity::Move(_) => "move",
            Activity::Attack(_) => "attack",
            Activity::Follow(_) => "follow",
            Activity::Patrol(_) => "patrol",
            Activity::Mine(_) => "mine",
            Activity::Dock(_) => "dock",
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Activity::Move(a) => a.state().name(),
            Activity::Attack(a) => a.state().name(),
            Activity::Follow(a) => a.state().name(),
            Activity::Patrol(a) => a.state().name(),
            Activity::Mine(a) => a.state().name(),
            Activity::Dock(a) => a.state().name(),
        }
    }

    /// Entity this activity is aimed at, if any.
    pub fn target(&self) -> Option<Entity> {
        match self {
            Activity::Move(_) | Activity::Patrol(_) => None,
            Activity::Attack(a) => Some(a.target()),
            Activity::Follow(a) => Some(a.target()),
            Activity::Mine(a) => a.resource(),
            Activity::Dock(a) => Some(a.host()),
        }
    }

    pub fn as_mine(&self) -> Option<&MineActivity> {
        match self {
            Activity::Mine(a) => Some(a),
            _ => None,
        }
    }

    /// Handles currently registered by this activity.
    pub fn subscriptions(&self) -> Vec<SubscriptionHandle> {
        match self {
            Activity::Move(_) | Activity::Patrol(_) => Vec::new(),
            Activity::Attack(a) => a.subscription().into_iter().collect(),
            Activity::Follow(a) => a.subscription().into_iter().collect(),
            Activity::Mine(a) => a.subscriptions(),
            Activity::Dock(a) => a.subscription().into_iter().collect(),
        }
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        match self {
            Activity::Move(a) => a.activate(ctx),
            Activity::Attack(a) => a.activate(ctx),
            Activity::Follow(a) => a.activate(ctx),
            Activity::Patrol(a) => a.activate(ctx),
            Activity::Mine(a) => a.activate(ctx),
            Activity::Dock(a) => a.activate(ctx),
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        match self {
            Activity::Move(a) => a.update(ctx),
            Activity::Attack(a) => a.update(ctx),
            Activity::Follow(a) => a.update(ctx),
            Activity::Patrol(a) => a.update(ctx),
            Activity::Mine(a) => a.update(ctx),
            Activity::Dock(a) => a.update(ctx),
        }
    }

    pub(crate) fn on_target_removed(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        handle: SubscriptionHandle,
        removed: &RemovedEntity,
    ) -> ActivityStatus {
        match self {
            Activity::Move(_) | Activity::Patrol(_) => ActivityStatus::Running,
            Activity::Attack(a) => a.on_target_removed(ctx, handle),
            Activity::Follow(a) => a.on_target_removed(ctx, handle),
            Activity::Mine(a) => a.on_target_removed(ctx, handle, removed),
            Activity::Dock(a) => a.on_target_removed(ctx, handle),
        }
    }

    pub(crate) fn kill(&mut self, ctx: &mut ActivityContext<'_>) {
        match self {
            Activity::Move(_) | Activity::Patrol(_) => {}
            Activity::Attack(a) => a.kill(ctx),
            Activity::Follow(a) => a.kill(ctx),
            Activity::Mine(a) => a.kill(ctx),
            Activity::Dock(a) => a.kill(ctx),
        }
    }
}

/// The active activity of an entity plus the ones queued behind it.
#[derive(Component, Debug, Clone, Default)]
pub struct ActivityQueue {
    current: Option<Activity>,
    queued: VecDeque<Activity>,
}

impl ActivityQueue {
    pub fn current(&self) -> Option<&Activity> {
        self.current.as_ref()
    }

    pub fn queued(&self) -> impl Iterator<Item = &Activity> {
        self.queued.iter()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }
}

/// World access for one activity of one entity during one call.
pub struct ActivityContext<'a> {
    world: &'a mut World,
    config: &'a SimConfig,
    entity: Entity,
    now_ms: f64,
    authoritative: bool,
}

impl<'a> ActivityContext<'a> {
    pub(crate) fn new(world: &'a mut World, config: &'a SimConfig, entity: Entity) -> Self {
        let clock = *world.resource::<SimClock>();
        Self {
            world,
            config,
            entity,
            now_ms: clock.elapsed_ms,
            authoritative: clock.authoritative,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Simulated time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn config(&self) -> &SimConfig {
        self.config
    }

    pub fn position_of(&self, entity: Entity) -> Option<Position> {
        self.world.get::<Position>(entity).copied()
    }

    pub fn position(&self) -> Option<Position> {
        self.position_of(self.entity)
    }

    pub fn distance_to(&self, target: Entity) -> Option<f32> {
        Some(self.position()?.distance_to(&self.position_of(target)?))
    }

    pub fn definition_of(&self, entity: Entity) -> Option<Arc<EntityDefinition>> {
        self.world.get::<Definition>(entity).map(|d| Arc::clone(&d.0))
    }

    pub fn team_of(&self, entity: Entity) -> Option<Team> {
        self.world.get::<Team>(entity).copied()
    }

    /// Exists, is not hibernated and has not been destroyed.
    pub fn is_available(&self, entity: Entity) -> bool {
        self.world.get::<Guid>(entity).is_some()
            && self.world.get::<Hibernated>(entity).is_none()
            && self.world.get::<Hull>(entity).map_or(true, Hull::is_intact)
    }

    /// This entity's allies from the last proximity pass.
    pub fn allies(&self) -> Vec<Entity> {
        self.world
            .get::<Proximity>(self.entity)
            .map(|p| p.allies.clone())
            .unwrap_or_default()
    }

    pub fn can_move(&self) -> bool {
        self.world.get::<Motion>(self.entity).is_some_and(Motion::can_move)
    }

    pub fn is_moving(&self) -> bool {
        self.world.get::<Motion>(self.entity).is_some_and(Motion::is_moving)
    }

    /// Start a fresh move to `point`.
    pub fn move_to(&mut self, point: Position) -> bool {
        self.world
            .get_mut::<Motion>(self.entity)
            .is_some_and(|mut motion| motion.move_to(point))
    }

    /// Head for `point` unless already moving there.
    pub fn approach(&mut self, point: Position) -> bool {
        let tolerance = self.config.arrival_tolerance;
        let heading_there = self
            .world
            .get::<Motion>(self.entity)
            .and_then(Motion::destination)
            .is_some_and(|dest| dest.distance_to(&point) <= tolerance);
        heading_there || self.move_to(point)
    }

    /// Brake if moving.
    pub fn stop(&mut self) {
        if let Some(mut motion) = self.world.get_mut::<Motion>(self.entity) {
            if motion.is_moving() {
                motion.stop();
            }
        }
    }

    pub fn subscribe_removal(&mut self, target: Entity) -> SubscriptionHandle {
        let subscriber = self.entity;
        self.world
            .resource_mut::<RemovalSubscriptions>()
            .subscribe(target, subscriber)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.world
            .resource_mut::<RemovalSubscriptions>()
            .unsubscribe(handle);
    }

    /// Nearest available station by true distance, ties to the lowest id.
    pub fn closest_station(&mut self) -> Option<Entity> {
        let origin = self.position()?;
        let station_id = self.config.mining_station_id.as_str();
        let mut query = self.world.query::<(Entity, &Position, &Definition)>();
        let stations: Vec<(Entity, f32)> = query
            .iter(self.world)
            .filter(|(entity, _, def)| *entity != self.entity && def.id == station_id)
            .map(|(entity, pos, _)| (entity, origin.distance_to(pos)))
            .collect();
        stations
            .into_iter()
            .filter(|(entity, _)| self.is_available(*entity))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(entity, _)| entity)
    }

    /// Shoot `target` if the weapon is ready. Only authoritative ticks deal
    /// damage.
    pub fn fire_at(&mut self, target: Entity) -> bool {
        if !self.authoritative || !self.is_available(target) {
            return false;
        }
        let Some(weapon) = self.definition_of(self.entity).and_then(|d| d.weapon) else {
            return false;
        };
        {
            let Some(mut state) = self.world.get_mut::<WeaponState>(self.entity) else {
                return false;
            };
            if !state.is_ready() {
                return false;
            }
            state.trigger(weapon.cooldown_ms);
        }
        if let Some(mut hull) = self.world.get_mut::<Hull>(target) {
            hull.apply_damage(weapon.damage);
        }
        true
    }

    /// Dock this entity into `host` if it has room.
    pub fn dock_into(&mut self, host: Entity) -> bool {
        let capacity = self.definition_of(host).map_or(0, |d| d.dock_capacity);
        let occupied = self
            .world
            .get::<DockedEntities>(host)
            .map_or(0, |docked| docked.0.len());
        if host == self.entity || occupied >= capacity {
            return false;
        }
        dock::dock_entity(self.world, self.entity, host)
    }
}

fn with_context<R>(
    world: &mut World,
    config: &SimConfig,
    entity: Entity,
    f: impl FnOnce(&mut ActivityContext<'_>) -> R,
) -> R {
    let mut ctx = ActivityContext::new(world, config, entity);
    f(&mut ctx)
}

fn take_current(world: &mut World, entity: Entity) -> Option<Activity> {
    world.get_mut::<ActivityQueue>(entity)?.current.take()
}

fn put_current(world: &mut World, entity: Entity, activity: Activity) {
    if let Some(mut queue) = world.get_mut::<ActivityQueue>(entity) {
        queue.current = Some(activity);
    }
}

fn pop_queued(world: &mut World, entity: Entity) -> Option<Activity> {
    world.get_mut::<ActivityQueue>(entity)?.queued.pop_front()
}

fn settle(world: &mut World, config: &SimConfig, entity: Entity, activity: Activity, status: ActivityStatus) {
    match status {
        ActivityStatus::Running => put_current(world, entity, activity),
        ActivityStatus::Finished => {
            trace!(?entity, activity = activity.name(), "activity finished");
            activate_next(world, config, entity);
        }
    }
}

fn activate_next(world: &mut World, config: &SimConfig, entity: Entity) {
    while let Some(mut next) = pop_queued(world, entity) {
        let status = with_context(world, config, entity, |ctx| next.activate(ctx));
        if status == ActivityStatus::Running {
            put_current(world, entity, next);
            return;
        }
    }
}

/// Run one handler of the entity's current activity.
pub(crate) fn advance(world: &mut World, config: &SimConfig, entity: Entity) {
    let Some(mut activity) = take_current(world, entity) else {
        return;
    };
    let status = with_context(world, config, entity, |ctx| activity.update(ctx));
    settle(world, config, entity, activity, status);
}

/// Install `activity` on `entity`.
///
/// With `add_as_last` on a busy entity the activity waits at the back of the
/// queue. Otherwise the current activity is killed first and the new one
/// activates right away.
pub(crate) fn install(
    world: &mut World,
    config: &SimConfig,
    entity: Entity,
    mut activity: Activity,
    add_as_last: bool,
) {
    let busy = world
        .get::<ActivityQueue>(entity)
        .is_some_and(|queue| queue.current.is_some());
    if add_as_last && busy {
        if let Some(mut queue) = world.get_mut::<ActivityQueue>(entity) {
            queue.queued.push_back(activity);
        }
        return;
    }

    if let Some(mut previous) = take_current(world, entity) {
        with_context(world, config, entity, |ctx| previous.kill(ctx));
    }
    let status = with_context(world, config, entity, |ctx| activity.activate(ctx));
    settle(world, config, entity, activity, status);
}

/// Kill the current activity and drop everything queued.
pub(crate) fn clear(world: &mut World, config: &SimConfig, entity: Entity) {
    if let Some(mut current) = take_current(world, entity) {
        with_context(world, config, entity, |ctx| current.kill(ctx));
    }
    if let Some(mut queue) = world.get_mut::<ActivityQueue>(entity) {
        queue.queued.clear();
    }
}

/// Hand a removal callback to the subscriber's current activity.
pub(crate) fn deliver_removal(
    world: &mut World,
    config: &SimConfig,
    subscriber: Entity,
    handle: SubscriptionHandle,
    removed: &RemovedEntity,
) {
    let Some(mut activity) = take_current(world, subscriber) else {
        return;
    };
    world.resource_mut::<RemovalSubscriptions>().record_delivery();
    let status = with_context(world, config, subscriber, |ctx| {
        activity.on_target_removed(ctx, handle, removed)
    });
    settle(world, config, subscriber, activity, status);
}
