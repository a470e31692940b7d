//! Activity system - advances every awake entity's activity by one handler.

use crate::activity::{self, ActivityQueue};
use crate::components::Hibernated;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;

/// Exclusive: activity handlers read and write arbitrary entities.
///
/// Entities run in id order. One that goes to sleep earlier in the same pass
/// (docking, for instance) is skipped.
pub fn activity_system(world: &mut World) {
    let config = world.resource::<SimConfig>().clone();

    let mut query = world.query_filtered::<Entity, (With<ActivityQueue>, Without<Hibernated>)>();
    let mut entities: Vec<Entity> = query.iter(world).collect();
    entities.sort();

    for entity in entities {
        if world.get::<Hibernated>(entity).is_some() {
            continue;
        }
        activity::advance(world, &config, entity);
    }
}
