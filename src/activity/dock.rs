//! Dock: fly to a host and enter it.

use super::{ActivityContext, ActivityStatus};
use crate::components::{Docked, DockedEntities, Guid, Hibernated, Position};
use crate::events::SubscriptionHandle;
use crate::motion::Motion;
use bevy_ecs::prelude::*;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockState {
    Approach,
    Enter,
}

impl DockState {
    pub fn name(self) -> &'static str {
        match self {
            DockState::Approach => "approach",
            DockState::Enter => "enter",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockActivity {
    host: Entity,
    subscription: Option<SubscriptionHandle>,
    state: DockState,
}

impl DockActivity {
    pub fn new(host: Entity) -> Self {
        Self {
            host,
            subscription: None,
            state: DockState::Approach,
        }
    }

    pub fn host(&self) -> Entity {
        self.host
    }

    pub fn state(&self) -> DockState {
        self.state
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let me = ctx.entity();
        let has_bay = ctx.definition_of(self.host).is_some_and(|d| d.dock_capacity > 0);
        let same_team = ctx.team_of(self.host).is_some() && ctx.team_of(self.host) == ctx.team_of(me);
        if self.host == me || !has_bay || !same_team || !ctx.is_available(self.host) {
            return ActivityStatus::Finished;
        }
        self.subscription = Some(ctx.subscribe_removal(self.host));
        ActivityStatus::Running
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let (Some(distance), Some(host_pos)) = (ctx.distance_to(self.host), ctx.position_of(self.host)) else {
            self.kill(ctx);
            return ActivityStatus::Finished;
        };
        if !ctx.is_available(self.host) {
            self.kill(ctx);
            return ActivityStatus::Finished;
        }

        match self.state {
            DockState::Approach => {
                if distance > ctx.config().dock_range {
                    ctx.approach(host_pos);
                } else {
                    ctx.stop();
                    self.state = DockState::Enter;
                }
                ActivityStatus::Running
            }
            DockState::Enter => {
                if !ctx.dock_into(self.host) {
                    debug!(entity = ?ctx.entity(), host = ?self.host, "dock refused, bay full");
                }
                self.kill(ctx);
                ActivityStatus::Finished
            }
        }
    }

    pub(crate) fn on_target_removed(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        handle: SubscriptionHandle,
    ) -> ActivityStatus {
        if self.subscription != Some(handle) {
            return ActivityStatus::Running;
        }
        self.subscription = None;
        self.kill(ctx);
        ActivityStatus::Finished
    }

    pub(crate) fn kill(&mut self, ctx: &mut ActivityContext<'_>) {
        if let Some(handle) = self.subscription.take() {
            ctx.unsubscribe(handle);
        }
    }
}

/// Put `entity` inside `host`: hibernate it, park it on the host and record
/// it in the host's bay. Capacity is the caller's concern.
pub(crate) fn dock_entity(world: &mut World, entity: Entity, host: Entity) -> bool {
    if world.get::<Guid>(entity).is_none() || world.get::<Guid>(host).is_none() {
        return false;
    }
    let host_pos = world.get::<Position>(host).copied().unwrap_or_default();

    if let Some(mut bay) = world.get_mut::<DockedEntities>(host) {
        bay.0.push(entity);
    } else {
        world.entity_mut(host).insert(DockedEntities(vec![entity]));
    }

    if let Some(mut motion) = world.get_mut::<Motion>(entity) {
        motion.halt();
    }
    world
        .entity_mut(entity)
        .insert((Docked { host }, Hibernated, host_pos));
    true
}

/// Release every entity docked in `host` onto a ring around it.
pub(crate) fn undock_all(world: &mut World, host: Entity, radius: f32) -> Vec<Entity> {
    let Some(host_pos) = world.get::<Position>(host).copied() else {
        return Vec::new();
    };
    let released = match world.get_mut::<DockedEntities>(host) {
        Some(mut bay) => std::mem::take(&mut bay.0),
        None => return Vec::new(),
    };

    let count = released.len().max(1) as f32;
    for (i, &entity) in released.iter().enumerate() {
        if world.get::<Guid>(entity).is_none() {
            continue;
        }
        let angle = std::f32::consts::TAU * i as f32 / count;
        let mut child = world.entity_mut(entity);
        child.remove::<(Docked, Hibernated)>();
        child.insert(host_pos.offset(angle, radius));
    }
    released
}
