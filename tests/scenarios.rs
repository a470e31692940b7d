//! End-to-end scenarios driven through the entity manager.

use fleet_sim::activity::MineState;
use fleet_sim::{
    Activity, Command, CommandKind, DefinitionStore, EntityManager, Notification, Position, Selector, SimConfig,
    SpawnConfig,
};
use bevy_ecs::entity::Entity;

fn manager() -> EntityManager {
    EntityManager::new(SimConfig::default(), DefinitionStore::builtin().unwrap()).unwrap()
}

fn mine_state(mgr: &EntityManager, miner: Entity) -> Option<MineState> {
    mgr.current_activity(miner)
        .and_then(Activity::as_mine)
        .map(|mine| mine.state())
}

/// Tick until the miner's state is `wanted`, panicking after `limit` ticks.
fn run_until_state(mgr: &mut EntityManager, miner: Entity, wanted: MineState, limit: usize) {
    for _ in 0..limit {
        if mine_state(mgr, miner) == Some(wanted) {
            return;
        }
        mgr.update(true);
    }
    panic!("miner never reached {:?}, stuck in {:?}", wanted, mine_state(mgr, miner));
}

/// Miner 200 units from a rock, station 300 units away.
fn mining_field(mgr: &mut EntityManager) -> (Entity, Entity, Entity) {
    let miner = mgr.add(SpawnConfig::new("harvester", "miner", 100.0, 100.0)).unwrap();
    let rock = mgr.add(SpawnConfig::new("asteroid", "rock", 300.0, 100.0)).unwrap();
    let station = mgr.add(SpawnConfig::new("miningstation", "station", 100.0, 400.0)).unwrap();
    (miner, rock, station)
}

fn mine(mgr: &mut EntityManager, target: &str) {
    let command = Command::new(CommandKind::Mine { target: Some(target.into()) }, ["miner"]);
    assert_eq!(mgr.dispatch(&command).unwrap(), 1);
}

#[test]
fn mine_cycle_visits_every_state_in_order() {
    let mut mgr = manager();
    let (miner, rock, station) = mining_field(&mut mgr);
    mine(&mut mgr, "rock");

    let mut sequence: Vec<(MineState, usize)> = Vec::new();
    for _ in 0..3000 {
        mgr.update(true);
        let state = mine_state(&mgr, miner).expect("mining stopped");
        match sequence.last_mut() {
            Some((last, ticks)) if *last == state => *ticks += 1,
            _ => sequence.push((state, 1)),
        }
        if sequence.len() == 8 {
            break;
        }
    }

    let states: Vec<MineState> = sequence.iter().map(|(state, _)| *state).collect();
    assert_eq!(
        states,
        vec![
            MineState::GoToResource,
            MineState::MineStarted,
            MineState::MineAnimating,
            MineState::MineFinished,
            MineState::ReturnToStation,
            MineState::CycleCompleted,
            MineState::GoToResource,
            MineState::MineStarted,
        ]
    );

    // Travel takes many ticks; bookkeeping states take exactly one.
    assert!(sequence[0].1 > 30);
    for &(state, ticks) in &sequence[1..6] {
        if state != MineState::MineAnimating && state != MineState::ReturnToStation {
            assert_eq!(ticks, 1, "{:?} lasted {} ticks", state, ticks);
        }
    }

    // 5000 ms at 30 Hz.
    let animating = sequence[2].1;
    assert!((145..=155).contains(&animating), "animated for {} ticks", animating);

    let activity = mgr.current_activity(miner).and_then(Activity::as_mine).unwrap();
    assert_eq!(activity.resource(), Some(rock));
    assert_eq!(activity.station(), Some(station));
}

#[test]
fn removed_resource_is_replaced_from_its_neighbours() {
    let mut mgr = manager();
    let (miner, rock, _) = mining_field(&mut mgr);
    let spare = mgr.add(SpawnConfig::new("asteroid", "spare", 340.0, 160.0)).unwrap();
    mine(&mut mgr, "rock");

    run_until_state(&mut mgr, miner, MineState::MineAnimating, 1000);
    mgr.remove(rock).unwrap();

    let activity = mgr.current_activity(miner).and_then(Activity::as_mine).unwrap();
    assert_eq!(activity.resource(), Some(spare));
    assert_eq!(activity.state(), MineState::GoToResource);
    assert_eq!(mgr.subscriptions().count_for(rock), 0);
    assert_eq!(mgr.subscriptions().count_for(spare), 1);

    mgr.update(true);
    let activity = mgr.current_activity(miner).and_then(Activity::as_mine).unwrap();
    assert_ne!(activity.resource(), Some(rock));
}

#[test]
fn removed_resource_without_replacement_ends_mining() {
    let mut mgr = manager();
    let (miner, rock, _) = mining_field(&mut mgr);
    mine(&mut mgr, "rock");

    run_until_state(&mut mgr, miner, MineState::MineAnimating, 1000);
    mgr.remove(rock).unwrap();

    assert!(mgr.current_activity(miner).is_none());
    assert!(mgr.subscriptions().is_empty());

    // The miner simply idles from here on.
    for _ in 0..10 {
        mgr.update(true);
    }
    assert!(mgr.activities(miner).unwrap().is_idle());
}

#[test]
fn removed_station_triggers_a_new_search() {
    let mut mgr = manager();
    let (miner, _, station) = mining_field(&mut mgr);
    let backup = mgr
        .add(SpawnConfig::new("miningstation", "backup", 600.0, 600.0))
        .unwrap();
    mine(&mut mgr, "rock");

    run_until_state(&mut mgr, miner, MineState::ReturnToStation, 2000);
    assert_eq!(
        mgr.current_activity(miner).and_then(Activity::as_mine).unwrap().station(),
        Some(station)
    );

    mgr.remove(station).unwrap();
    let activity = mgr.current_activity(miner).and_then(Activity::as_mine).unwrap();
    assert_eq!(activity.station(), Some(backup));
    assert_eq!(mgr.subscriptions().count_for(backup), 1);

    mgr.remove(backup).unwrap();
    assert!(mgr.current_activity(miner).is_none());
    assert!(mgr.subscriptions().is_empty());
}

#[test]
fn killed_activity_receives_no_removal_callbacks() {
    let mut mgr = manager();
    let (miner, rock, station) = mining_field(&mut mgr);
    mine(&mut mgr, "rock");

    run_until_state(&mut mgr, miner, MineState::ReturnToStation, 2000);
    assert_eq!(mgr.subscriptions().count_for(rock), 1);
    assert_eq!(mgr.subscriptions().count_for(station), 1);

    mgr.dispatch(&Command::new(CommandKind::Stop, ["miner"])).unwrap();
    assert!(mgr.subscriptions().is_empty());

    mgr.remove(rock).unwrap();
    mgr.remove(station).unwrap();
    assert_eq!(mgr.subscriptions().delivered(), 0);
    assert!(mgr.current_activity(miner).is_none());
}

#[test]
fn replacing_an_activity_kills_the_previous_one() {
    let mut mgr = manager();
    let (miner, rock, _) = mining_field(&mut mgr);
    mine(&mut mgr, "rock");
    mgr.update(true);
    assert_eq!(mgr.subscriptions().count_for(rock), 1);

    let move_away = Command::new(
        CommandKind::Move {
            waypoints: vec![Position::new(100.0, 600.0)],
        },
        ["miner"],
    );
    mgr.dispatch(&move_away).unwrap();

    assert!(mgr.subscriptions().is_empty());
    assert_eq!(mgr.current_activity(miner).map(Activity::name), Some("move"));
}

#[test]
fn removal_cascades_to_docked_entities() {
    let mut mgr = manager();
    let carrier = mgr.add(SpawnConfig::new("carrier", "carrier", 400.0, 400.0)).unwrap();
    let first = mgr
        .add(SpawnConfig::new("fighter", "f1", 0.0, 0.0).docked_in("carrier"))
        .unwrap();
    let second = mgr
        .add(SpawnConfig::new("fighter", "f2", 0.0, 0.0).docked_in("carrier"))
        .unwrap();
    let bystander = mgr.add(SpawnConfig::new("harvester", "h1", 1000.0, 1000.0)).unwrap();
    let enemy = mgr
        .add(SpawnConfig::new("fighter", "enemy", 800.0, 400.0).team(2))
        .unwrap();
    mgr.dispatch(&Command::new(CommandKind::Attack { target: Some("carrier".into()) }, ["enemy"]))
        .unwrap();
    mgr.update(true);

    let carrier_tile = mgr.collision_map().tile_at(&Position::new(400.0, 400.0));
    assert!(mgr.collision_map().is_occupied(carrier_tile));
    assert_eq!(mgr.docked_entities(carrier), vec![first, second]);

    mgr.remove(carrier).unwrap();

    let remaining = mgr.entities(&Selector::All);
    for gone in [carrier, first, second] {
        assert!(!remaining.contains(&gone));
    }
    assert!(remaining.contains(&bystander));
    assert!(!mgr.collision_map().is_occupied(carrier_tile));

    let indexed: Vec<Entity> = mgr
        .spatial_index()
        .retrieve(&mgr.spatial_index().bounds())
        .into_iter()
        .map(|entry| entry.entity)
        .collect();
    assert!(!indexed.contains(&carrier));
    assert!(indexed.contains(&bystander));

    // The attacker heard about the removal and went idle.
    assert_eq!(mgr.subscriptions().delivered(), 1);
    assert!(mgr.activities(enemy).unwrap().is_idle());

    let counts: Vec<usize> = mgr
        .drain_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::EntityCountChanged { count } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(counts.last(), Some(&2));
}

#[test]
fn grid_update_is_idempotent() {
    let mut mgr = manager();
    mgr.add(SpawnConfig::new("miningstation", "station", 100.0, 100.0)).unwrap();
    mgr.drain_notifications();

    let grid_changes = |mgr: &mut EntityManager| {
        mgr.drain_notifications()
            .into_iter()
            .filter(|n| *n == Notification::CollisionGridChanged)
            .count()
    };

    mgr.update(true);
    assert_eq!(grid_changes(&mut mgr), 1);
    assert!(mgr.collision_map().is_dirty());

    mgr.update(true);
    assert_eq!(grid_changes(&mut mgr), 0);
    assert!(!mgr.collision_map().is_dirty());
}

#[test]
fn proximity_has_no_false_negatives_or_positives() {
    let mut mgr = manager();

    // Small LCG keeps the layout deterministic.
    let mut seed: u32 = 0x2545_f491;
    let mut next = move || {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed >> 8) as f32 / (1u32 << 24) as f32
    };

    for i in 0..200 {
        let type_id = if i % 3 == 0 { "carrier" } else { "harvester" };
        let team = if i % 2 == 0 { 1 } else { 2 };
        let spawn = SpawnConfig::new(type_id, format!("e{i}"), next() * 2000.0, next() * 2000.0).team(team);
        mgr.add(spawn).unwrap();
    }
    mgr.update(false);

    let entities = mgr.entities(&Selector::All);
    for &a in &entities {
        let view = mgr.view(a).unwrap();
        let weapon_range = view.definition.weapon_range();
        let max_distance = weapon_range.max(1.25 * view.definition.vision_range);
        let proximity = mgr.proximity(a).unwrap();

        for candidate in &proximity.candidates {
            assert!(candidate.distance <= max_distance);
            assert_ne!(candidate.entity, a);
        }
        for &b in &entities {
            if a == b {
                continue;
            }
            let distance = view.position.distance_to(&mgr.position(b).unwrap());
            if distance <= weapon_range {
                let found = proximity.candidate(b).expect("in-range entity missing");
                assert!(found.in_range);
            }
            if distance <= max_distance {
                assert!(proximity.candidate(b).is_some());
            }
        }

        let distances: Vec<f32> = proximity.candidates.iter().map(|c| c.distance).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn attack_destroys_target_on_authoritative_ticks_only() {
    let mut mgr = manager();
    let fighter = mgr.add(SpawnConfig::new("fighter", "f1", 100.0, 100.0)).unwrap();
    let target = mgr
        .add(SpawnConfig::new("harvester", "prey", 400.0, 100.0).team(2))
        .unwrap();
    mgr.dispatch(&Command::new(CommandKind::Attack { target: Some("prey".into()) }, ["f1"]))
        .unwrap();

    for _ in 0..300 {
        mgr.update(false);
    }
    assert_eq!(mgr.hull(target).unwrap().current, 150.0);

    for _ in 0..2000 {
        mgr.update(true);
        if mgr.by_guid("prey").is_none() {
            break;
        }
    }
    assert!(mgr.by_guid("prey").is_none());
    assert!(mgr.activities(fighter).unwrap().is_idle());
    assert!(mgr.subscriptions().is_empty());
}

#[test]
fn non_authoritative_ticks_advance_activities_without_damage() {
    let mut mgr = manager();
    let (miner, rock, _) = mining_field(&mut mgr);
    let raider = mgr
        .add(SpawnConfig::new("fighter", "raider", 140.0, 100.0).team(2))
        .unwrap();
    mine(&mut mgr, "rock");
    let start = mgr.position(miner).unwrap();

    let mut reached = false;
    for _ in 0..2000 {
        mgr.update(false);
        if mine_state(&mgr, miner) == Some(MineState::MineAnimating) {
            reached = true;
            break;
        }
    }

    // Activities, motion and subscriptions run locally.
    assert!(reached, "miner stuck in {:?}", mine_state(&mgr, miner));
    assert!(mgr.position(miner).unwrap().distance_to(&start) > 100.0);
    assert_eq!(mgr.subscriptions().count_for(rock), 1);
    // Weapons stay silent.
    assert_eq!(mgr.hull(miner).unwrap().current, 150.0);
    assert!(mgr.by_guid("raider").is_some());
    assert!(!mgr.is_hibernated(raider));
}

#[test]
fn dock_then_undock_through_commands() {
    let mut mgr = manager();
    let carrier = mgr.add(SpawnConfig::new("carrier", "carrier", 400.0, 100.0)).unwrap();
    let fighter = mgr.add(SpawnConfig::new("fighter", "f1", 150.0, 100.0)).unwrap();

    mgr.dispatch(&Command::new(CommandKind::Dock { target: Some("carrier".into()) }, ["f1"]))
        .unwrap();
    for _ in 0..1000 {
        mgr.update(true);
        if mgr.is_hibernated(fighter) {
            break;
        }
    }
    assert!(mgr.is_hibernated(fighter));
    assert_eq!(mgr.docked_entities(carrier), vec![fighter]);
    assert!(mgr.activities(fighter).unwrap().is_idle());
    assert!(!mgr.entities(&Selector::NotHibernated).contains(&fighter));

    mgr.dispatch(&Command::new(CommandKind::Undock, ["carrier"])).unwrap();
    assert!(!mgr.is_hibernated(fighter));
    assert!(mgr.docked_entities(carrier).is_empty());
    let distance = mgr.position(fighter).unwrap().distance_to(&Position::new(400.0, 100.0));
    assert!((distance - mgr.config().undock_radius).abs() < 1e-3);
}

#[test]
fn patrol_shuttles_between_endpoints() {
    let mut mgr = manager();
    let ship = mgr.add(SpawnConfig::new("harvester", "h1", 100.0, 100.0)).unwrap();
    mgr.dispatch(&Command::new(
        CommandKind::Patrol {
            destination: Some(Position::new(300.0, 100.0)),
        },
        ["h1"],
    ))
    .unwrap();

    let mut reached_far_end = false;
    let mut came_back = false;
    for _ in 0..2000 {
        mgr.update(true);
        let x = mgr.position(ship).unwrap().x;
        if x > 290.0 {
            reached_far_end = true;
        }
        if reached_far_end && x < 110.0 {
            came_back = true;
            break;
        }
    }
    assert!(reached_far_end && came_back);
    assert_eq!(mgr.current_activity(ship).map(Activity::name), Some("patrol"));
}

#[test]
fn follow_holds_near_a_moving_target() {
    let mut mgr = manager();
    let leader = mgr.add(SpawnConfig::new("harvester", "leader", 100.0, 100.0)).unwrap();
    let follower = mgr.add(SpawnConfig::new("fighter", "follower", 100.0, 500.0)).unwrap();

    mgr.dispatch(&Command::new(CommandKind::Follow { target: Some("leader".into()) }, ["follower"]))
        .unwrap();
    mgr.dispatch(&Command::new(
        CommandKind::Move {
            waypoints: vec![Position::new(500.0, 100.0)],
        },
        ["leader"],
    ))
    .unwrap();

    for _ in 0..900 {
        mgr.update(true);
    }
    let gap = mgr
        .position(follower)
        .unwrap()
        .distance_to(&mgr.position(leader).unwrap());
    assert!(gap < 200.0, "follower trailing by {}", gap);
    assert_eq!(mgr.current_activity(follower).map(Activity::name), Some("follow"));

    mgr.remove(leader).unwrap();
    assert!(mgr.activities(follower).unwrap().is_idle());
}
