//! Entity removal - the docked-children cascade and the destruction sweep.
//!
//! Removal runs in a fixed order so every observer sees a consistent world:
//!
//! 1. Hibernate the root and everything docked inside it (recursively), so
//!    nothing being removed can be picked as a replacement target.
//! 2. Detach the root from its host's bay.
//! 3. Deliver removal callbacks to every subscriber that is not itself being
//!    removed, in subscription order.
//! 4. Kill the removed entities' own activities, releasing their handles.
//! 5. Release their grid marks and despawn them.

use crate::activity::{self, RemovedEntity};
use crate::collision::CollisionMap;
use crate::components::{Docked, DockedEntities, Guid, Hibernated, Hull, OccupiedTile, Proximity};
use crate::config::{SimClock, SimConfig};
use crate::events::{Notification, Notifications, RemovalSubscriptions};
use bevy_ecs::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Remove `root` and everything docked inside it. Returns the removed
/// entities, root first.
pub fn despawn_cascade(world: &mut World, config: &SimConfig, root: Entity) -> Vec<Entity> {
    if world.get::<Guid>(root).is_none() {
        return Vec::new();
    }

    // 1. Collect and hibernate.
    let mut doomed = Vec::new();
    let mut stack = vec![root];
    while let Some(entity) = stack.pop() {
        if doomed.contains(&entity) || world.get::<Guid>(entity).is_none() {
            continue;
        }
        doomed.push(entity);
        if let Some(bay) = world.get::<DockedEntities>(entity) {
            stack.extend(bay.0.iter().rev().copied());
        }
    }
    for &entity in &doomed {
        world.entity_mut(entity).insert(Hibernated);
    }

    // 2. Detach from the host.
    if let Some(Docked { host }) = world.get::<Docked>(root).copied() {
        if let Some(mut bay) = world.get_mut::<DockedEntities>(host) {
            bay.0.retain(|&e| e != root);
        }
    }

    // 3. Notify subscribers.
    let doomed_set: HashSet<Entity> = doomed.iter().copied().collect();
    for &entity in &doomed {
        let removed = RemovedEntity {
            entity,
            allies: world
                .get::<Proximity>(entity)
                .map(|p| p.allies.clone())
                .unwrap_or_default(),
        };
        let subscribers = world.resource_mut::<RemovalSubscriptions>().take_for(entity);
        for (handle, subscriber) in subscribers {
            if doomed_set.contains(&subscriber) {
                continue;
            }
            activity::deliver_removal(world, config, subscriber, handle, &removed);
        }
    }

    // 4. Kill their own activities.
    for &entity in &doomed {
        activity::clear(world, config, entity);
    }

    // 5. Release grid marks and despawn.
    world.resource_scope(|world, mut map: Mut<CollisionMap>| {
        for &entity in &doomed {
            if let Some(mut tile) = world.get_mut::<OccupiedTile>(entity) {
                map.evict(&mut tile);
            }
        }
    });
    for &entity in &doomed {
        world.despawn(entity);
    }

    debug!(?root, removed = doomed.len(), "entity removed");
    doomed
}

/// Remove every entity whose hull has been destroyed. Authoritative ticks
/// only.
pub fn destruction_sweep_system(world: &mut World) {
    if !world.resource::<SimClock>().authoritative {
        return;
    }

    let mut query = world.query::<(Entity, &Hull)>();
    let mut destroyed: Vec<Entity> = query
        .iter(world)
        .filter(|(_, hull)| !hull.is_intact())
        .map(|(entity, _)| entity)
        .collect();
    if destroyed.is_empty() {
        return;
    }
    destroyed.sort();

    let config = world.resource::<SimConfig>().clone();
    for entity in destroyed {
        despawn_cascade(world, &config, entity);
    }

    let mut count_query = world.query::<&Guid>();
    let count = count_query.iter(world).count();
    world
        .resource_mut::<Notifications>()
        .emit(Notification::EntityCountChanged { count });
}
