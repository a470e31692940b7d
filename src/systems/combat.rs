//! Auto-engagement - idle armed entities fire at the closest hostile in range.
//!
//! Runs on authoritative ticks only. Entities busy with an activity are left
//! alone; an Attack activity fires on its own schedule.
//!
//! Two phases, like the proximity pass:
//! 1. **Gather** - tick weapon cooldowns and collect damage intents from every
//!    idle shooter whose weapon is ready.
//! 2. **Apply** - add up the intents per target and subtract them from hulls.

use crate::activity::ActivityQueue;
use crate::components::{Definition, Hibernated, Hull, Proximity, WeaponState};
use crate::config::SimClock;
use bevy_ecs::prelude::*;
use std::collections::HashMap;
use tracing::trace;

/// Damage intents collected during the gather phase.
#[derive(Debug, Default, Clone)]
pub struct CombatResults {
    pub damage: HashMap<Entity, f32>,
    /// Entities that fired this tick.
    pub fired: Vec<Entity>,
}

impl CombatResults {
    pub fn add_hit(&mut self, shooter: Entity, target: Entity, damage: f32) {
        *self.damage.entry(target).or_insert(0.0) += damage;
        self.fired.push(shooter);
    }
}

pub fn combat_system(
    clock: Res<SimClock>,
    mut shooters: Query<
        (Entity, &Definition, &Proximity, &ActivityQueue, &mut WeaponState),
        Without<Hibernated>,
    >,
    mut hulls: Query<&mut Hull, Without<Hibernated>>,
) {
    if !clock.authoritative {
        return;
    }

    // Gather
    let elapsed_ms = clock.dt_ms();
    let mut results = CombatResults::default();
    for (entity, definition, proximity, activities, mut weapon) in shooters.iter_mut() {
        weapon.cool_down(elapsed_ms);
        let Some(gun) = definition.weapon else {
            continue;
        };
        if !activities.is_idle() || !weapon.is_ready() {
            continue;
        }
        // Proximity predates this tick's activities; the target may have docked since.
        let Some(target) = proximity
            .closest_hostile_in_range
            .filter(|&target| hulls.contains(target))
        else {
            continue;
        };
        weapon.trigger(gun.cooldown_ms);
        results.add_hit(entity, target, gun.damage);
    }

    // Apply
    for (target, damage) in results.damage {
        if let Ok(mut hull) = hulls.get_mut(target) {
            hull.apply_damage(damage);
            trace!(?target, damage, remaining = hull.current, "hull hit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Candidate, Team};
    use crate::definitions::{EntityDefinition, WeaponDefinition};
    use std::sync::Arc;

    fn setup(authoritative: bool) -> (World, Schedule, Entity, Entity) {
        let mut world = World::new();
        world.insert_resource(SimClock {
            tick: 1,
            dt: 0.1,
            authoritative,
            ..Default::default()
        });

        let gun = Definition(Arc::new(EntityDefinition {
            id: "gun".into(),
            weapon: Some(WeaponDefinition {
                range: 100.0,
                damage: 15.0,
                cooldown_ms: 1000.0,
            }),
            ..Default::default()
        }));
        let target_def = Definition(Arc::new(EntityDefinition {
            id: "target".into(),
            ..Default::default()
        }));

        let target = world
            .spawn((
                Team(2),
                target_def,
                Proximity::default(),
                ActivityQueue::default(),
                WeaponState::default(),
                Hull::new(100.0),
            ))
            .id();
        let shooter = world
            .spawn((
                Team(1),
                gun,
                Proximity {
                    candidates: vec![Candidate {
                        entity: target,
                        distance: 50.0,
                        in_vision: true,
                        in_range: true,
                    }],
                    closest_hostile_in_range: Some(target),
                    closest_hostile_in_vision: Some(target),
                    allies: Vec::new(),
                },
                ActivityQueue::default(),
                WeaponState::default(),
                Hull::new(100.0),
            ))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(combat_system);
        (world, schedule, shooter, target)
    }

    #[test]
    fn test_idle_shooter_fires_and_cools_down() {
        let (mut world, mut schedule, shooter, target) = setup(true);

        schedule.run(&mut world);
        assert_eq!(world.get::<Hull>(target).unwrap().current, 85.0);
        assert!(!world.get::<WeaponState>(shooter).unwrap().is_ready());

        // 100 ms later the weapon is still cooling down.
        schedule.run(&mut world);
        assert_eq!(world.get::<Hull>(target).unwrap().current, 85.0);
    }

    #[test]
    fn test_hibernated_target_is_not_hit() {
        let (mut world, mut schedule, shooter, target) = setup(true);
        world.entity_mut(target).insert(Hibernated);

        schedule.run(&mut world);
        assert_eq!(world.get::<Hull>(target).unwrap().current, 100.0);
        // The shot is held for a reachable target.
        assert!(world.get::<WeaponState>(shooter).unwrap().is_ready());
    }

    #[test]
    fn test_non_authoritative_tick_deals_no_damage() {
        let (mut world, mut schedule, _, target) = setup(false);
        for _ in 0..5 {
            schedule.run(&mut world);
        }
        assert_eq!(world.get::<Hull>(target).unwrap().current, 100.0);
    }
}
