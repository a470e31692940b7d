//! Error types for the simulation boundaries.
//!
//! Configuration problems (bad JSON, unregistered entity types, malformed
//! commands) are reported through these enums at the call boundary and never
//! leave the simulation partially mutated. Losing a target mid-activity is
//! not an error; activities recover or terminate on their own.

use bevy_ecs::entity::Entity;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or registering entity definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to parse entity definitions: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read entity definitions from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate entity definition id '{0}'")]
    Duplicate(String),
    #[error("invalid entity definition '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// Failures while loading the simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid simulation config: {0}")]
    Invalid(String),
}

/// Rejected spawn requests.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to parse spawn config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entity type '{0}' is not registered")]
    UnregisteredType(String),
    #[error("spawn config is missing a guid")]
    MissingGuid,
    #[error("an entity with guid '{0}' already exists")]
    DuplicateGuid(String),
    #[error("home station '{0}' does not exist")]
    UnknownHomeStation(String),
    #[error("home station '{0}' cannot host another docked entity")]
    HomeStationFull(String),
}

/// Rejected commands. A rejected command applies to no entity at all.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to parse command: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("command has no target entities")]
    NoTargets,
    #[error("command references unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("command is missing a target entity")]
    MissingTarget,
    #[error("command is missing coordinates")]
    MissingCoordinates,
}

/// Umbrella error for the public simulation API.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("entity {0:?} does not exist")]
    UnknownEntity(Entity),
    #[error("no entity with guid '{0}'")]
    UnknownGuid(String),
}
