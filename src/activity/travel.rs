//! Move, Follow and Patrol.

use super::{ActivityContext, ActivityStatus};
use crate::components::Position;
use crate::events::SubscriptionHandle;
use bevy_ecs::entity::Entity;

// ============================================================================
// MOVE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Start,
    Travelling,
}

impl MoveState {
    pub fn name(self) -> &'static str {
        match self {
            MoveState::Start => "start",
            MoveState::Travelling => "travelling",
        }
    }
}

/// Travel to a point, then finish.
#[derive(Debug, Clone)]
pub struct MoveActivity {
    destination: Position,
    state: MoveState,
}

impl MoveActivity {
    pub fn new(destination: Position) -> Self {
        Self {
            destination,
            state: MoveState::Start,
        }
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        if ctx.can_move() {
            ActivityStatus::Running
        } else {
            ActivityStatus::Finished
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        match self.state {
            MoveState::Start => {
                ctx.move_to(self.destination);
                self.state = MoveState::Travelling;
                ActivityStatus::Running
            }
            MoveState::Travelling if ctx.is_moving() => ActivityStatus::Running,
            MoveState::Travelling => ActivityStatus::Finished,
        }
    }
}

// ============================================================================
// FOLLOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Track,
    Hold,
}

impl FollowState {
    pub fn name(self) -> &'static str {
        match self {
            FollowState::Track => "track",
            FollowState::Hold => "hold",
        }
    }
}

/// Stay within the follow distance of a target for as long as it exists.
#[derive(Debug, Clone)]
pub struct FollowActivity {
    target: Entity,
    subscription: Option<SubscriptionHandle>,
    state: FollowState,
}

impl FollowActivity {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            subscription: None,
            state: FollowState::Track,
        }
    }

    pub fn target(&self) -> Entity {
        self.target
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        if self.target == ctx.entity() || !ctx.is_available(self.target) || !ctx.can_move() {
            return ActivityStatus::Finished;
        }
        self.subscription = Some(ctx.subscribe_removal(self.target));
        ActivityStatus::Running
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let (Some(distance), Some(target_pos)) = (ctx.distance_to(self.target), ctx.position_of(self.target))
        else {
            self.kill(ctx);
            return ActivityStatus::Finished;
        };
        if !ctx.is_available(self.target) {
            self.kill(ctx);
            return ActivityStatus::Finished;
        }

        let follow_distance = ctx.config().follow_distance;
        match self.state {
            FollowState::Track if distance > follow_distance => {
                ctx.approach(target_pos);
            }
            FollowState::Track => {
                ctx.stop();
                self.state = FollowState::Hold;
            }
            FollowState::Hold if distance > follow_distance => {
                self.state = FollowState::Track;
            }
            FollowState::Hold => {}
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

// ============================================================================
// PATROL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatrolState {
    StartOutbound,
    Outbound,
    StartReturn,
    Return,
}

impl PatrolState {
    pub fn name(self) -> &'static str {
        match self {
            PatrolState::StartOutbound => "start_outbound",
            PatrolState::Outbound => "outbound",
            PatrolState::StartReturn => "start_return",
            PatrolState::Return => "return",
        }
    }
}

/// Shuttle between the activation point and a destination until replaced.
#[derive(Debug, Clone)]
pub struct PatrolActivity {
    origin: Position,
    destination: Position,
    state: PatrolState,
}

impl PatrolActivity {
    pub fn new(destination: Position) -> Self {
        Self {
            origin: destination,
            destination,
            state: PatrolState::StartOutbound,
        }
    }

    pub fn origin(&self) -> Position {
        self.origin
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn state(&self) -> PatrolState {
        self.state
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        match ctx.position() {
            Some(origin) if ctx.can_move() => {
                self.origin = origin;
                ActivityStatus::Running
            }
            _ => ActivityStatus::Finished,
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        self.state = match self.state {
            PatrolState::StartOutbound => {
                ctx.move_to(self.destination);
                PatrolState::Outbound
            }
            PatrolState::Outbound if ctx.is_moving() => PatrolState::Outbound,
            PatrolState::Outbound => PatrolState::StartReturn,
            PatrolState::StartReturn => {
                ctx.move_to(self.origin);
                PatrolState::Return
            }
            PatrolState::Return if ctx.is_moving() => PatrolState::Return,
            PatrolState::Return => PatrolState::StartOutbound,
        };
        ActivityStatus::Running
    }
}
