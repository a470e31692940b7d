//! Motion system - runs each entity's effect pipeline and integrates position.

use crate::collision::CollisionMap;
use crate::components::{Hibernated, OccupiedTile, Position};
use crate::config::SimClock;
use crate::events::{Notification, Notifications};
use crate::motion::{Motion, MotionSignal};
use bevy_ecs::prelude::*;

/// Steps every awake entity's motion and forwards the signals its effects
/// raise: moved/stopped notifications and immediate occupancy rechecks.
pub fn motion_system(
    clock: Res<SimClock>,
    mut map: ResMut<CollisionMap>,
    mut notifications: ResMut<Notifications>,
    mut query: Query<(Entity, &mut Position, &mut Motion, &mut OccupiedTile), Without<Hibernated>>,
) {
    let dt = clock.dt;
    let mut signals = Vec::new();
    for (entity, mut pos, mut motion, mut tile) in query.iter_mut() {
        signals.clear();
        motion.step(&mut pos, dt, &mut signals);

        for signal in signals.drain(..) {
            match signal {
                MotionSignal::Moved => notifications.emit(Notification::EntityMoved { entity }),
                MotionSignal::Stopped => notifications.emit(Notification::EntityStopped { entity }),
                MotionSignal::RecheckOccupancy => map.recheck_entity(&mut tile, &pos),
            }
        }
    }
}
