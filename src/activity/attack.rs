//! Attack: close to weapon range, then fire until the target is gone.

use super::{ActivityContext, ActivityStatus};
use crate::events::SubscriptionHandle;
use bevy_ecs::entity::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    Approach,
    Engage,
}

impl AttackState {
    pub fn name(self) -> &'static str {
        match self {
            AttackState::Approach => "approach",
            AttackState::Engage => "engage",
        }
    }
}

type AttackHandler = fn(&mut AttackActivity, &mut ActivityContext<'_>, f32, f32) -> ActivityStatus;

#[derive(Debug, Clone)]
pub struct AttackActivity {
    target: Entity,
    subscription: Option<SubscriptionHandle>,
    state: AttackState,
}

impl AttackActivity {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            subscription: None,
            state: AttackState::Approach,
        }
    }

    pub fn target(&self) -> Entity {
        self.target
    }

    pub fn state(&self) -> AttackState {
        self.state
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    fn handler(state: AttackState) -> AttackHandler {
        match state {
            AttackState::Approach => Self::approach,
            AttackState::Engage => Self::engage,
        }
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let me = ctx.entity();
        let armed = ctx.definition_of(me).is_some_and(|d| d.has_weapon());
        let targetable = ctx.definition_of(self.target).is_some_and(|d| d.targetable);
        if self.target == me || !armed || !targetable || !ctx.is_available(self.target) {
            return ActivityStatus::Finished;
        }
        self.subscription = Some(ctx.subscribe_removal(self.target));
        ActivityStatus::Running
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let range = ctx.definition_of(ctx.entity()).map_or(0.0, |d| d.weapon_range());
        let distance = match ctx.distance_to(self.target) {
            Some(distance) if ctx.is_available(self.target) => distance,
            _ => {
                self.kill(ctx);
                return ActivityStatus::Finished;
            }
        };
        Self::handler(self.state)(self, ctx, distance, range)
    }

    fn approach(&mut self, ctx: &mut ActivityContext<'_>, distance: f32, range: f32) -> ActivityStatus {
        if distance > range {
            if let Some(target_pos) = ctx.position_of(self.target) {
                ctx.approach(target_pos);
            }
        } else {
            ctx.stop();
            self.state = AttackState::Engage;
        }
        ActivityStatus::Running
    }

    fn engage(&mut self, ctx: &mut ActivityContext<'_>, distance: f32, range: f32) -> ActivityStatus {
        if distance > range {
            self.state = AttackState::Approach;
        } else {
            ctx.fire_at(self.target);
        }
        ActivityStatus::Running
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
