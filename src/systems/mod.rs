//! Per-tick ECS systems.
//!
//! ## Tick order
//!
//! The update schedule chains, in this order:
//!
//! 1. `collision_update_system` - re-mark occupied cells
//! 2. `pathfinding_sync_system` - copy a changed grid into the pathfinder
//! 3. `spatial_index_update_system` - rebuild the quadtree
//! 4. `proximity_system` - candidates, targets and allies per entity
//! 5. `activity_system` - one handler per entity (exclusive)
//! 6. `motion_system` - effect pipelines and integration
//! 7. `combat_system` - auto-engagement (authoritative only)
//! 8. `destruction_sweep_system` - remove destroyed entities (authoritative
//!    only, exclusive)
//!
//! Grid, index and proximity data are only valid in that order.

pub mod activities;
pub mod combat;
pub mod lifecycle;
pub mod movement;
pub mod proximity;

pub use activities::activity_system;
pub use combat::{combat_system, CombatResults};
pub use lifecycle::{despawn_cascade, destruction_sweep_system};
pub use movement::motion_system;
pub use proximity::{proximity_system, VISION_SCAN_FACTOR};
