//! Fleet Simulation Core
//!
//! A deterministic, fixed-timestep ECS simulation of many autonomous units:
//! per-entity activity machines, a quadtree-backed proximity resolver, a
//! motion effect pipeline and an occupancy grid feeding a pathfinder.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod activity;
pub mod api;
pub mod collision;
pub mod commands;
pub mod components;
pub mod config;
pub mod definitions;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod motion;
pub mod pathfinding;
pub mod spatial;
pub mod systems;
pub mod world;

pub use activity::{Activity, ActivityQueue, ActivityStatus};
pub use api::SimWorld;
pub use collision::{ChunkRect, CollisionMap};
pub use commands::{Command, CommandKind};
pub use components::*;
pub use config::{SimClock, SimConfig};
pub use definitions::{Ability, DefinitionStore, EntityDefinition};
pub use error::{CommandError, ConfigError, DefinitionError, SimError, SpawnError};
pub use events::{ListenerHandle, Notification, Notifications, RemovalSubscriptions, SubscriptionHandle};
pub use manager::{EntityManager, EntityView, Selector, SpawnConfig};
pub use motion::{Effect, EffectPipeline, Motion};
pub use pathfinding::PathfindingGrid;
pub use spatial::{QuadTree, Rect, SpatialEntry};
pub use world::Snapshot;
