//! Mining cycle: fly to a resource, mine it, deliver to the nearest station,
//! repeat.
//!
//! The activity watches both the resource and the station for removal. A
//! removed resource is replaced from the neighbours it had when it went away
//! (then from the miner's own neighbours); a removed station triggers a fresh
//! station search. With nothing to replace it the activity ends.

use super::{ActivityContext, ActivityStatus, RemovedEntity};
use crate::events::SubscriptionHandle;
use bevy_ecs::entity::Entity;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MineState {
    GoToResource,
    MineStarted,
    MineAnimating,
    MineFinished,
    ReturnToStation,
    CycleCompleted,
}

impl MineState {
    pub fn name(self) -> &'static str {
        match self {
            MineState::GoToResource => "go_to_resource",
            MineState::MineStarted => "mine_started",
            MineState::MineAnimating => "mine_animating",
            MineState::MineFinished => "mine_finished",
            MineState::ReturnToStation => "return_to_station",
            MineState::CycleCompleted => "cycle_completed",
        }
    }
}

type MineHandler = fn(&mut MineActivity, &mut ActivityContext<'_>) -> ActivityStatus;

/// State → handler table, indexed by `MineState as usize`.
const HANDLERS: [MineHandler; 6] = [
    MineActivity::go_to_resource,
    MineActivity::mine_started,
    MineActivity::mine_animating,
    MineActivity::mine_finished,
    MineActivity::return_to_station,
    MineActivity::cycle_completed,
];

#[derive(Debug, Clone)]
pub struct MineActivity {
    state: MineState,
    resource: Option<Entity>,
    resource_subscription: Option<SubscriptionHandle>,
    station: Option<Entity>,
    station_subscription: Option<SubscriptionHandle>,
    mining_done_at_ms: f64,
    killed: bool,
}

impl MineActivity {
    pub fn new(resource: Entity) -> Self {
        Self {
            state: MineState::GoToResource,
            resource: Some(resource),
            resource_subscription: None,
            station: None,
            station_subscription: None,
            mining_done_at_ms: 0.0,
            killed: false,
        }
    }

    pub fn state(&self) -> MineState {
        self.state
    }

    pub fn resource(&self) -> Option<Entity> {
        self.resource
    }

    pub fn station(&self) -> Option<Entity> {
        self.station
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionHandle> {
        self.resource_subscription
            .into_iter()
            .chain(self.station_subscription)
            .collect()
    }

    pub(crate) fn activate(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        match self.resource {
            Some(resource) if is_resource(ctx, resource) && ctx.can_move() => {
                self.set_resource(ctx, resource);
                ActivityStatus::Running
            }
            _ => {
                self.kill(ctx);
                ActivityStatus::Finished
            }
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        if self.killed {
            return ActivityStatus::Finished;
        }
        HANDLERS[self.state as usize](self, ctx)
    }

    fn go_to_resource(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let Some(resource) = self.resource.filter(|&r| ctx.is_available(r)) else {
            self.kill(ctx);
            return ActivityStatus::Finished;
        };
        let (Some(distance), Some(target)) = (ctx.distance_to(resource), ctx.position_of(resource)) else {
            self.kill(ctx);
            return ActivityStatus::Finished;
        };

        if distance > ctx.config().mine_min_range {
            ctx.approach(target);
        } else {
            ctx.stop();
            self.state = MineState::MineStarted;
        }
        ActivityStatus::Running
    }

    fn mine_started(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        self.mining_done_at_ms = ctx.now_ms() + ctx.config().mine_duration_ms;
        self.state = MineState::MineAnimating;
        ActivityStatus::Running
    }

    fn mine_animating(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        if ctx.now_ms() >= self.mining_done_at_ms {
            self.state = MineState::MineFinished;
        }
        ActivityStatus::Running
    }

    fn mine_finished(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        if !self.select_closest_station(ctx) {
            return ActivityStatus::Finished;
        }
        self.state = MineState::ReturnToStation;
        ActivityStatus::Running
    }

    fn return_to_station(&mut self, ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        let station = match self.station.filter(|&s| ctx.is_available(s)) {
            Some(station) => station,
            None => {
                if !self.select_closest_station(ctx) {
                    return ActivityStatus::Finished;
                }
                return ActivityStatus::Running;
            }
        };
        let (Some(distance), Some(target)) = (ctx.distance_to(station), ctx.position_of(station)) else {
            self.kill(ctx);
            return ActivityStatus::Finished;
        };

        if distance > ctx.config().mine_min_range {
            ctx.approach(target);
        } else {
            ctx.stop();
            self.state = MineState::CycleCompleted;
        }
        ActivityStatus::Running
    }

    fn cycle_completed(&mut self, _ctx: &mut ActivityContext<'_>) -> ActivityStatus {
        self.state = MineState::GoToResource;
        ActivityStatus::Running
    }

    pub(crate) fn on_target_removed(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        handle: SubscriptionHandle,
        removed: &RemovedEntity,
    ) -> ActivityStatus {
        if self.killed {
            return ActivityStatus::Finished;
        }

        if self.resource_subscription == Some(handle) {
            self.resource_subscription = None;
            self.resource = None;
            return match replacement_resource(ctx, removed) {
                Some(next) => {
                    debug!(entity = ?ctx.entity(), resource = ?next, "mining resource replaced");
                    self.set_resource(ctx, next);
                    self.state = MineState::GoToResource;
                    ActivityStatus::Running
                }
                None => {
                    self.kill(ctx);
                    ActivityStatus::Finished
                }
            };
        }

        if self.station_subscription == Some(handle) {
            self.station_subscription = None;
            self.station = None;
            if !self.select_closest_station(ctx) {
                return ActivityStatus::Finished;
            }
        }
        ActivityStatus::Running
    }

    /// Detach both removal subscriptions and drop the targets.
    pub(crate) fn kill(&mut self, ctx: &mut ActivityContext<'_>) {
        if let Some(handle) = self.resource_subscription.take() {
            ctx.unsubscribe(handle);
        }
        if let Some(handle) = self.station_subscription.take() {
            ctx.unsubscribe(handle);
        }
        self.resource = None;
        self.station = None;
        self.killed = true;
    }

    fn set_resource(&mut self, ctx: &mut ActivityContext<'_>, resource: Entity) {
        if let Some(handle) = self.resource_subscription.take() {
            ctx.unsubscribe(handle);
        }
        self.resource = Some(resource);
        self.resource_subscription = Some(ctx.subscribe_removal(resource));
    }

    /// Returns false (and kills the activity) when no station exists.
    fn select_closest_station(&mut self, ctx: &mut ActivityContext<'_>) -> bool {
        let Some(station) = ctx.closest_station() else {
            debug!(entity = ?ctx.entity(), "no mining station left");
            self.kill(ctx);
            return false;
        };
        if self.station != Some(station) || self.station_subscription.is_none() {
            if let Some(handle) = self.station_subscription.take() {
                ctx.unsubscribe(handle);
            }
            self.station = Some(station);
            self.station_subscription = Some(ctx.subscribe_removal(station));
        }
        true
    }
}

fn is_resource(ctx: &ActivityContext<'_>, entity: Entity) -> bool {
    ctx.is_available(entity) && ctx.definition_of(entity).is_some_and(|d| d.resource)
}

fn replacement_resource(ctx: &ActivityContext<'_>, removed: &RemovedEntity) -> Option<Entity> {
    removed
        .allies
        .iter()
        .copied()
        .chain(ctx.allies())
        .find(|&candidate| candidate != removed.entity && is_resource(ctx, candidate))
}
