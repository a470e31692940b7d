//! Command dispatch.
//!
//! Commands name their issuing entities and targets by GUID. Every reference
//! is resolved before anything is applied, so a rejected command leaves the
//! simulation untouched.

use crate::activity::{
    self, Activity, AttackActivity, DockActivity, FollowActivity, MineActivity, MoveActivity, PatrolActivity,
};
use crate::components::Position;
use crate::error::CommandError;
use crate::manager::EntityManager;
use crate::motion::Motion;
use bevy_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What a command asks its entities to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    /// Travel through each waypoint in turn.
    Move {
        #[serde(default)]
        waypoints: Vec<Position>,
    },
    Attack {
        #[serde(default)]
        target: Option<String>,
    },
    /// Shuttle between the current position and `destination`.
    Patrol {
        #[serde(default)]
        destination: Option<Position>,
    },
    Stop,
    Follow {
        #[serde(default)]
        target: Option<String>,
    },
    Mine {
        #[serde(default)]
        target: Option<String>,
    },
    Dock {
        #[serde(default)]
        target: Option<String>,
    },
    /// Release everything docked in the issuing entities.
    Undock,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Move { .. } => "move",
            CommandKind::Attack { .. } => "attack",
            CommandKind::Patrol { .. } => "patrol",
            CommandKind::Stop => "stop",
            CommandKind::Follow { .. } => "follow",
            CommandKind::Mine { .. } => "mine",
            CommandKind::Dock { .. } => "dock",
            CommandKind::Undock => "undock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub kind: CommandKind,
    /// GUIDs of the entities the command applies to.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Drop queued activities before applying.
    #[serde(default)]
    pub reset_activity_queue: bool,
    /// Queue behind the current activity instead of replacing it.
    #[serde(default)]
    pub add_as_last: bool,
}

impl Command {
    pub fn new(kind: CommandKind, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            targets: targets.into_iter().map(Into::into).collect(),
            reset_activity_queue: false,
            add_as_last: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn queued(mut self) -> Self {
        self.add_as_last = true;
        self
    }

    pub fn resetting_queue(mut self) -> Self {
        self.reset_activity_queue = true;
        self
    }
}

/// A command with every reference resolved.
enum Plan {
    /// One activity per step; the first replaces, the rest queue.
    Install(Vec<Activity>),
    Stop,
    Undock,
}

impl EntityManager {
    /// Apply `command` to its target entities. Returns how many entities it
    /// was applied to.
    pub fn dispatch(&mut self, command: &Command) -> Result<usize, CommandError> {
        let (entities, plan) = match self.resolve(command) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(command = command.kind.name(), %err, "command rejected");
                return Err(err);
            }
        };

        let config = self.config().clone();
        for &entity in &entities {
            match &plan {
                Plan::Install(steps) => {
                    let world = self.world_mut();
                    if command.reset_activity_queue {
                        activity::clear(world, &config, entity);
                    }
                    for (i, step) in steps.iter().enumerate() {
                        let add_as_last = command.add_as_last || i > 0;
                        activity::install(world, &config, entity, step.clone(), add_as_last);
                    }
                }
                Plan::Stop => {
                    let world = self.world_mut();
                    activity::clear(world, &config, entity);
                    if let Some(mut motion) = world.get_mut::<Motion>(entity) {
                        if motion.is_moving() {
                            motion.stop();
                        }
                    }
                }
                Plan::Undock => {
                    self.undock(entity);
                }
            }
        }

        info!(command = command.kind.name(), entities = entities.len(), "command dispatched");
        Ok(entities.len())
    }

    fn resolve(&self, command: &Command) -> Result<(Vec<Entity>, Plan), CommandError> {
        if command.targets.is_empty() {
            return Err(CommandError::NoTargets);
        }
        let entities = command
            .targets
            .iter()
            .map(|guid| self.resolve_guid(guid))
            .collect::<Result<Vec<_>, _>>()?;

        let plan = match &command.kind {
            CommandKind::Move { waypoints } => {
                if waypoints.is_empty() {
                    return Err(CommandError::MissingCoordinates);
                }
                Plan::Install(
                    waypoints
                        .iter()
                        .map(|&point| Activity::Move(MoveActivity::new(point)))
                        .collect(),
                )
            }
            CommandKind::Patrol { destination } => {
                let destination = destination.ok_or(CommandError::MissingCoordinates)?;
                Plan::Install(vec![Activity::Patrol(PatrolActivity::new(destination))])
            }
            CommandKind::Attack { target } => {
                let target = self.resolve_target(target.as_deref())?;
                Plan::Install(vec![Activity::Attack(AttackActivity::new(target))])
            }
            CommandKind::Follow { target } => {
                let target = self.resolve_target(target.as_deref())?;
                Plan::Install(vec![Activity::Follow(FollowActivity::new(target))])
            }
            CommandKind::Mine { target } => {
                let target = self.resolve_target(target.as_deref())?;
                Plan::Install(vec![Activity::Mine(MineActivity::new(target))])
            }
            CommandKind::Dock { target } => {
                let target = self.resolve_target(target.as_deref())?;
                Plan::Install(vec![Activity::Dock(DockActivity::new(target))])
            }
            CommandKind::Stop => Plan::Stop,
            CommandKind::Undock => Plan::Undock,
        };
        Ok((entities, plan))
    }

    fn resolve_guid(&self, guid: &str) -> Result<Entity, CommandError> {
        self.by_guid(guid)
            .ok_or_else(|| CommandError::UnknownEntity(guid.to_string()))
    }

    fn resolve_target(&self, guid: Option<&str>) -> Result<Entity, CommandError> {
        self.resolve_guid(guid.ok_or(CommandError::MissingTarget)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::definitions::DefinitionStore;
    use crate::manager::SpawnConfig;

    fn manager() -> EntityManager {
        let mut mgr = EntityManager::new(SimConfig::default(), DefinitionStore::builtin().unwrap()).unwrap();
        mgr.add(SpawnConfig::new("harvester", "h1", 100.0, 100.0)).unwrap();
        mgr.add(SpawnConfig::new("asteroid", "rock", 300.0, 100.0)).unwrap();
        mgr
    }

    #[test]
    fn test_json_shape() {
        let command = Command::from_json_str(
            r#"{ "type": "move", "waypoints": [{ "x": 1, "y": 2 }, { "x": 3, "y": 4 }], "targets": ["h1"] }"#,
        )
        .unwrap();
        assert_eq!(
            command.kind,
            CommandKind::Move {
                waypoints: vec![Position::new(1.0, 2.0), Position::new(3.0, 4.0)]
            }
        );
        assert!(!command.add_as_last);

        let stop = Command::from_json_str(r#"{ "type": "stop", "targets": ["h1"] }"#).unwrap();
        assert_eq!(stop.kind, CommandKind::Stop);

        assert!(matches!(
            Command::from_json_str(r#"{ "type": "warp", "targets": [] }"#),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn test_waypoints_queue_in_order() {
        let mut mgr = manager();
        let h1 = mgr.by_guid("h1").unwrap();
        let command = Command::new(
            CommandKind::Move {
                waypoints: vec![Position::new(200.0, 100.0), Position::new(200.0, 200.0)],
            },
            ["h1"],
        );
        assert_eq!(mgr.dispatch(&command).unwrap(), 1);

        let queue = mgr.activities(h1).unwrap();
        assert_eq!(queue.current().map(Activity::name), Some("move"));
        assert_eq!(queue.queued_len(), 1);
    }

    #[test]
    fn test_rejected_commands_change_nothing() {
        let mut mgr = manager();
        let h1 = mgr.by_guid("h1").unwrap();

        let cases = [
            Command::new(CommandKind::Mine { target: Some("rock".into()) }, Vec::<String>::new()),
            Command::new(CommandKind::Mine { target: Some("rock".into()) }, ["h1", "ghost"]),
            Command::new(CommandKind::Mine { target: None }, ["h1"]),
            Command::new(CommandKind::Mine { target: Some("ghost".into()) }, ["h1"]),
            Command::new(CommandKind::Move { waypoints: Vec::new() }, ["h1"]),
            Command::new(CommandKind::Patrol { destination: None }, ["h1"]),
        ];
        for command in &cases {
            assert!(mgr.dispatch(command).is_err(), "{:?} should be rejected", command.kind);
        }
        assert!(mgr.activities(h1).unwrap().is_idle());
        assert!(mgr.subscriptions().is_empty());
    }

    #[test]
    fn test_mine_command_installs_and_stop_kills() {
        let mut mgr = manager();
        let h1 = mgr.by_guid("h1").unwrap();
        let rock = mgr.by_guid("rock").unwrap();

        mgr.dispatch(&Command::new(CommandKind::Mine { target: Some("rock".into()) }, ["h1"]))
            .unwrap();
        assert_eq!(mgr.current_activity(h1).and_then(Activity::target), Some(rock));
        assert_eq!(mgr.subscriptions().count_for(rock), 1);

        mgr.dispatch(&Command::new(CommandKind::Stop, ["h1"])).unwrap();
        assert!(mgr.activities(h1).unwrap().is_idle());
        assert_eq!(mgr.subscriptions().count_for(rock), 0);
    }
}
