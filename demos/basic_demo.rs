//! Basic demonstration of the fleet simulation.
//!
//! Run with: cargo run --example basic_demo

use fleet_sim::{logging, Notification, SimWorld};

fn main() -> Result<(), fleet_sim::SimError> {
    logging::init();
    println!("=== Fleet Simulation Demo ===\n");

    let mut sim = SimWorld::with_builtin_definitions()?;

    sim.spawn_json(r#"{ "type": "miningstation", "guid": "station", "x": 200, "y": 600 }"#)?;
    sim.spawn_json(r#"{ "type": "asteroid", "guid": "rock", "x": 700, "y": 300 }"#)?;
    sim.spawn_json(r#"{ "type": "harvester", "guid": "miner", "x": 0, "y": 0, "home_station": "station" }"#)?;
    sim.spawn_json(r#"{ "type": "carrier", "guid": "carrier", "x": 300, "y": 300 }"#)?;
    for i in 0..3 {
        sim.spawn_json(&format!(
            r#"{{ "type": "fighter", "guid": "fighter{i}", "home_station": "carrier" }}"#
        ))?;
    }
    sim.spawn_json(r#"{ "type": "fighter", "guid": "raider", "team": 2, "x": 1200, "y": 300 }"#)?;

    // Release everything, then put it to work.
    sim.dispatch_json(r#"{ "type": "undock", "targets": ["station", "carrier"] }"#)?;
    sim.dispatch_json(r#"{ "type": "mine", "target": "rock", "targets": ["miner"] }"#)?;
    sim.dispatch_json(r#"{ "type": "attack", "target": "raider", "targets": ["fighter0", "fighter1"] }"#)?;
    sim.dispatch_json(
        r#"{ "type": "patrol", "destination": { "x": 600, "y": 600 }, "targets": ["fighter2"] }"#,
    )?;

    println!("Initial state:");
    print_snapshot(&sim);

    // 20 seconds at 60 frames per second.
    for frame in 0..1200 {
        sim.step(1.0 / 60.0);
        if (frame + 1) % 300 == 0 {
            println!("\n--- Tick {} ---", sim.current_tick());
            print_snapshot(&sim);
        }
    }

    let notifications = sim.manager_mut().drain_notifications();
    let grid_changes = notifications
        .iter()
        .filter(|n| **n == Notification::CollisionGridChanged)
        .count();
    println!("\nGrid changes still in the log: {}", grid_changes);

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty().unwrap_or_default());
    Ok(())
}

fn print_snapshot(sim: &SimWorld) {
    for entity in sim.snapshot().entities {
        println!(
            "  {:<10} team {} pos=({:7.1}, {:7.1}) hull={:6.0} {}{}",
            entity.guid,
            entity.team,
            entity.x,
            entity.y,
            entity.hull,
            entity.activity.as_deref().unwrap_or("idle"),
            entity
                .activity_state
                .map(|state| format!(" [{state}]"))
                .unwrap_or_default(),
        );
    }
}
