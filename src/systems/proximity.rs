//! Proximity resolution - who is near whom, and who to shoot.
//!
//! ## Phases
//!
//! 1. **Gather** - O(n): snapshot team, ranges and targetability of every
//!    non-hibernated entity into a lookup table.
//! 2. **Compute** - O(n × k), k = quadtree candidates per query: for each
//!    observer, query the quadtree with a square of half-size `max_distance`,
//!    filter by true distance, sort and classify. Reads only immutable data,
//!    so it runs on rayon under the `parallel` feature.
//! 3. **Apply** - O(n): write the results into each entity's `Proximity`.
//!
//! Candidate order is ascending distance with ties broken by lowest entity id,
//! so both builds produce identical caches.

use crate::components::{Candidate, Definition, Hibernated, Position, Proximity, Team};
use crate::config::SimClock;
use crate::spatial::{QuadTree, Rect};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Vision is scanned a quarter beyond its nominal range.
pub const VISION_SCAN_FACTOR: f32 = 1.25;

/// Per-entity data the compute phase needs.
#[derive(Debug, Clone, Copy)]
struct Observer {
    entity: Entity,
    position: Position,
    team: Team,
    vision_range: f32,
    weapon_range: f32,
    armed: bool,
    targetable: bool,
}

impl Observer {
    fn max_distance(&self) -> f32 {
        self.weapon_range.max(self.vision_range * VISION_SCAN_FACTOR)
    }
}

fn resolve(observer: &Observer, index: &QuadTree, lookup: &HashMap<Entity, Observer>) -> Proximity {
    let max_distance = observer.max_distance();
    let area = Rect::centered(observer.position.x, observer.position.y, max_distance, max_distance);

    let mut candidates: Vec<Candidate> = index
        .retrieve(&area)
        .into_iter()
        .filter(|entry| entry.entity != observer.entity)
        .filter_map(|entry| {
            // Absent from the lookup means hibernated or gone.
            let other = lookup.get(&entry.entity)?;
            let distance = observer.position.distance_to(&other.position);
            (distance <= max_distance).then_some(Candidate {
                entity: entry.entity,
                distance,
                in_vision: distance <= observer.vision_range,
                in_range: distance <= observer.weapon_range,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.entity.cmp(&b.entity)));

    let mut proximity = Proximity::default();
    for candidate in &candidates {
        let Some(other) = lookup.get(&candidate.entity) else {
            continue;
        };
        if other.team == observer.team {
            proximity.allies.push(candidate.entity);
            continue;
        }
        if !(observer.armed && other.targetable) {
            continue;
        }
        if candidate.in_range && proximity.closest_hostile_in_range.is_none() {
            proximity.closest_hostile_in_range = Some(candidate.entity);
        }
        if (candidate.in_vision || candidate.in_range) && proximity.closest_hostile_in_vision.is_none() {
            proximity.closest_hostile_in_vision = Some(candidate.entity);
        }
    }
    proximity.candidates = candidates;
    proximity
}

/// Recomputes every entity's `Proximity` from this tick's quadtree.
///
/// # Panics
///
/// If the quadtree was not rebuilt during the current tick.
pub fn proximity_system(
    index: Res<QuadTree>,
    clock: Res<SimClock>,
    observers: Query<(Entity, &Position, &Team, &Definition), Without<Hibernated>>,
    mut caches: Query<(Entity, &mut Proximity)>,
) {
    assert!(
        index.is_built_for(clock.tick),
        "proximity resolved before the spatial index was built for tick {}",
        clock.tick
    );

    // Gather
    let lookup: HashMap<Entity, Observer> = observers
        .iter()
        .map(|(entity, pos, team, def)| {
            let observer = Observer {
                entity,
                position: *pos,
                team: *team,
                vision_range: def.vision_range,
                weapon_range: def.weapon_range(),
                armed: def.has_weapon(),
                targetable: def.targetable,
            };
            (entity, observer)
        })
        .collect();

    // Compute
    let index: &QuadTree = &index;
    #[cfg(feature = "parallel")]
    let mut results: HashMap<Entity, Proximity> = lookup
        .par_iter()
        .map(|(entity, observer)| (*entity, resolve(observer, index, &lookup)))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let mut results: HashMap<Entity, Proximity> = lookup
        .iter()
        .map(|(entity, observer)| (*entity, resolve(observer, index, &lookup)))
        .collect();

    // Apply
    for (entity, mut cache) in caches.iter_mut() {
        match results.remove(&entity) {
            Some(proximity) => *cache = proximity,
            None => cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{EntityDefinition, WeaponDefinition};
    use crate::spatial::spatial_index_update_system;
    use std::sync::Arc;

    fn def(id: &str, vision: f32, weapon: Option<f32>) -> Definition {
        Definition(Arc::new(EntityDefinition {
            id: id.into(),
            vision_range: vision,
            weapon: weapon.map(|range| WeaponDefinition {
                range,
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    fn world() -> (World, Schedule) {
        let mut world = World::new();
        world.insert_resource(QuadTree::new(Rect::new(0.0, 0.0, 2000.0, 2000.0), 4, 5));
        world.insert_resource(SimClock {
            tick: 1,
            ..Default::default()
        });
        let mut schedule = Schedule::default();
        schedule.add_systems((spatial_index_update_system, proximity_system).chain());
        (world, schedule)
    }

    fn spawn(world: &mut World, x: f32, y: f32, team: u8, definition: Definition) -> Entity {
        world
            .spawn((Position::new(x, y), Team(team), definition, Proximity::default()))
            .id()
    }

    #[test]
    fn test_classification_and_targets() {
        let (mut world, mut schedule) = world();
        let gunner = spawn(&mut world, 100.0, 100.0, 1, def("gun", 100.0, Some(50.0)));
        let near_enemy = spawn(&mut world, 140.0, 100.0, 2, def("enemy", 100.0, None));
        let far_enemy = spawn(&mut world, 210.0, 100.0, 2, def("enemy", 100.0, None));
        let friend = spawn(&mut world, 100.0, 160.0, 1, def("friend", 100.0, None));
        let too_far = spawn(&mut world, 100.0, 300.0, 2, def("enemy", 100.0, None));

        schedule.run(&mut world);

        let prox = world.get::<Proximity>(gunner).unwrap();
        let ids: Vec<Entity> = prox.candidates.iter().map(|c| c.entity).collect();
        assert_eq!(ids, vec![near_enemy, friend, far_enemy]);
        assert!(!ids.contains(&too_far));

        let near = prox.candidate(near_enemy).unwrap();
        assert!(near.in_range && near.in_vision);
        let far = prox.candidate(far_enemy).unwrap();
        assert!(!far.in_range && !far.in_vision);

        assert_eq!(prox.closest_hostile_in_range, Some(near_enemy));
        assert_eq!(prox.closest_hostile_in_vision, Some(near_enemy));
        assert_eq!(prox.allies, vec![friend]);

        // Unarmed entities see hostiles but never pick targets.
        let friend_prox = world.get::<Proximity>(friend).unwrap();
        assert!(friend_prox.closest_hostile_in_vision.is_none());
        assert_eq!(friend_prox.allies, vec![gunner]);
    }

    #[test]
    fn test_ties_break_on_lowest_id() {
        let (mut world, mut schedule) = world();
        let center = spawn(&mut world, 500.0, 500.0, 1, def("gun", 100.0, Some(100.0)));
        let a = spawn(&mut world, 560.0, 500.0, 2, def("enemy", 0.0, None));
        let b = spawn(&mut world, 440.0, 500.0, 2, def("enemy", 0.0, None));

        schedule.run(&mut world);

        let prox = world.get::<Proximity>(center).unwrap();
        assert_eq!(prox.closest_hostile_in_range, Some(a.min(b)));
    }

    #[test]
    fn test_hibernated_excluded_and_cleared() {
        let (mut world, mut schedule) = world();
        let watcher = spawn(&mut world, 100.0, 100.0, 1, def("gun", 200.0, Some(100.0)));
        let sleeper = spawn(&mut world, 120.0, 100.0, 2, def("enemy", 200.0, Some(100.0)));

        schedule.run(&mut world);
        assert!(world.get::<Proximity>(sleeper).unwrap().candidate(watcher).is_some());

        world.entity_mut(sleeper).insert(Hibernated);
        world.resource_mut::<SimClock>().tick = 2;
        schedule.run(&mut world);

        assert!(world.get::<Proximity>(watcher).unwrap().candidates.is_empty());
        assert!(world.get::<Proximity>(sleeper).unwrap().candidates.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_stale_index_panics() {
        let (mut world, _) = world();
        spawn(&mut world, 0.0, 0.0, 1, def("gun", 10.0, None));
        let mut schedule = Schedule::default();
        schedule.add_systems(proximity_system);
        schedule.run(&mut world);
    }
}
