//! Occupancy grid over the map tiles.
//!
//! Each cell keeps a count of the entities standing on it; the boolean view
//! consumed by pathfinding and minimap code is `count > 0`. The grid is only
//! mutated by the per-tick pipeline and by entity removal.

use crate::components::{Hibernated, OccupiedTile, Position};
use crate::events::{Notification, Notifications};
use bevy_ecs::prelude::*;
use bevy_ecs::query::Has;
use tracing::trace;

/// Tile coordinates `(column, row)`.
pub type Tile = (i32, i32);

/// Rectangular window into the grid, in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Resource, Debug, Clone)]
pub struct CollisionMap {
    width: usize,
    height: usize,
    tile_size: f32,
    counts: Vec<u16>,
    dirty: bool,
    /// Cell changes made outside `update` (rechecks, removals), folded into
    /// the next update's dirty flag.
    pending_change: bool,
}

impl CollisionMap {
    pub fn new(width: usize, height: usize, tile_size: f32) -> Self {
        Self {
            width,
            height,
            tile_size,
            counts: vec![0; width * height],
            dirty: false,
            pending_change: false,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Tile containing a world position.
    #[inline]
    pub fn tile_at(&self, pos: &Position) -> Tile {
        (
            (pos.x / self.tile_size).floor() as i32,
            (pos.y / self.tile_size).floor() as i32,
        )
    }

    #[inline]
    fn index(&self, (x, y): Tile) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Mark a cell. Returns true if the cell became occupied.
    pub fn visit(&mut self, tile: Tile) -> bool {
        let Some(i) = self.index(tile) else {
            return false;
        };
        self.counts[i] = self.counts[i].saturating_add(1);
        self.counts[i] == 1
    }

    /// Unmark a cell. Returns true if the cell became free.
    pub fn unvisit(&mut self, tile: Tile) -> bool {
        let Some(i) = self.index(tile) else {
            return false;
        };
        if self.counts[i] == 0 {
            return false;
        }
        self.counts[i] -= 1;
        self.counts[i] == 0
    }

    pub fn is_occupied(&self, tile: Tile) -> bool {
        self.index(tile).is_some_and(|i| self.counts[i] > 0)
    }

    /// Entities currently counted on a cell.
    pub fn occupants(&self, tile: Tile) -> u16 {
        self.index(tile).map_or(0, |i| self.counts[i])
    }

    pub fn occupied_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Whether the last update changed any cell.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Full boolean view, row-major (`matrix[row][column]`).
    pub fn matrix(&self) -> Vec<Vec<bool>> {
        self.counts
            .chunks(self.width.max(1))
            .map(|row| row.iter().map(|&c| c > 0).collect())
            .collect()
    }

    /// Boolean view of a window, clipped to the grid.
    pub fn chunk(&self, rect: ChunkRect) -> Vec<Vec<bool>> {
        let x_end = (rect.x + rect.width).min(self.width);
        let y_end = (rect.y + rect.height).min(self.height);
        (rect.y.min(y_end)..y_end)
            .map(|y| {
                (rect.x.min(x_end)..x_end)
                    .map(|x| self.counts[y * self.width + x] > 0)
                    .collect()
            })
            .collect()
    }

    /// Move an entity's mark to the tile under `pos`. Returns true if any
    /// cell's boolean value changed.
    pub(crate) fn place(&mut self, occupied: &mut OccupiedTile, pos: &Position) -> bool {
        let tile = self.tile_at(pos);
        match occupied.0 {
            Some(previous) if previous == tile => false,
            Some(previous) => {
                let freed = self.unvisit(previous);
                let taken = self.visit(tile);
                occupied.0 = Some(tile);
                freed || taken
            }
            None => {
                occupied.0 = Some(tile);
                self.visit(tile)
            }
        }
    }

    /// Drop an entity's mark. Returns true if its cell became free.
    pub(crate) fn release(&mut self, occupied: &mut OccupiedTile) -> bool {
        match occupied.0.take() {
            Some(tile) => self.unvisit(tile),
            None => false,
        }
    }

    /// Apply an entity's current tile right away, outside the tick update.
    pub(crate) fn recheck_entity(&mut self, occupied: &mut OccupiedTile, pos: &Position) {
        if self.place(occupied, pos) {
            self.pending_change = true;
        }
    }

    /// Release a mark outside the tick update.
    pub(crate) fn evict(&mut self, occupied: &mut OccupiedTile) {
        if self.release(occupied) {
            self.pending_change = true;
        }
    }

    fn begin_update(&mut self) {
        self.dirty = std::mem::take(&mut self.pending_change);
    }
}

/// Re-marks every entity's cell and announces a change at most once.
pub fn collision_update_system(
    mut map: ResMut<CollisionMap>,
    mut notifications: ResMut<Notifications>,
    mut query: Query<(&Position, &mut OccupiedTile, Has<Hibernated>)>,
) {
    map.begin_update();
    let mut changed = false;
    for (pos, mut tile, hibernated) in query.iter_mut() {
        changed |= if hibernated {
            map.release(&mut tile)
        } else {
            map.place(&mut tile, pos)
        };
    }

    if changed || map.dirty {
        map.dirty = true;
        trace!(occupied = map.occupied_count(), "collision grid changed");
        notifications.emit(Notification::CollisionGridChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_counts_and_bounds() {
        let mut map = CollisionMap::new(4, 3, 10.0);
        assert!(map.visit((1, 1)));
        assert!(!map.visit((1, 1)));
        assert_eq!(map.occupants((1, 1)), 2);

        assert!(!map.unvisit((1, 1)));
        assert!(map.is_occupied((1, 1)));
        assert!(map.unvisit((1, 1)));
        assert!(!map.is_occupied((1, 1)));
        assert!(!map.unvisit((1, 1)));

        assert!(!map.visit((-1, 0)));
        assert!(!map.visit((4, 0)));
        assert!(!map.unvisit((0, 3)));
        assert_eq!(map.occupied_count(), 0);
    }

    #[test]
    fn test_matrix_and_chunk() {
        let mut map = CollisionMap::new(4, 3, 10.0);
        map.visit((3, 0));
        map.visit((1, 2));

        let matrix = map.matrix();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[0], vec![false, false, false, true]);
        assert_eq!(matrix[2], vec![false, true, false, false]);

        let chunk = map.chunk(ChunkRect {
            x: 1,
            y: 1,
            width: 10,
            height: 10,
        });
        assert_eq!(chunk, vec![vec![false, false, false], vec![true, false, false]]);
    }

    #[test]
    fn test_place_moves_mark() {
        let mut map = CollisionMap::new(8, 8, 10.0);
        let mut tile = OccupiedTile::default();

        assert!(map.place(&mut tile, &Position::new(15.0, 15.0)));
        assert_eq!(tile.0, Some((1, 1)));
        assert!(!map.place(&mut tile, &Position::new(19.0, 11.0)));
        assert!(map.place(&mut tile, &Position::new(25.0, 15.0)));
        assert!(!map.is_occupied((1, 1)));
        assert!(map.is_occupied((2, 1)));

        assert!(map.release(&mut tile));
        assert_eq!(map.occupied_count(), 0);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut world = World::new();
        world.insert_resource(CollisionMap::new(8, 8, 10.0));
        world.insert_resource(Notifications::default());
        world.spawn((Position::new(12.0, 12.0), OccupiedTile::default()));
        world.spawn((Position::new(55.0, 32.0), OccupiedTile::default()));

        let mut schedule = Schedule::default();
        schedule.add_systems(collision_update_system);

        schedule.run(&mut world);
        assert!(world.resource::<CollisionMap>().is_dirty());
        assert_eq!(world.resource_mut::<Notifications>().drain().len(), 1);

        schedule.run(&mut world);
        assert!(!world.resource::<CollisionMap>().is_dirty());
        assert!(world.resource_mut::<Notifications>().drain().is_empty());
    }

    #[test]
    fn test_hibernated_releases_cell() {
        let mut world = World::new();
        world.insert_resource(CollisionMap::new(8, 8, 10.0));
        world.insert_resource(Notifications::default());
        let e = world
            .spawn((Position::new(12.0, 12.0), OccupiedTile::default()))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(collision_update_system);
        schedule.run(&mut world);
        assert!(world.resource::<CollisionMap>().is_occupied((1, 1)));

        world.entity_mut(e).insert(Hibernated);
        schedule.run(&mut world);
        let map = world.resource::<CollisionMap>();
        assert!(!map.is_occupied((1, 1)));
        assert!(map.is_dirty());
    }

    #[test]
    fn test_recheck_folds_into_next_update() {
        let mut world = World::new();
        world.insert_resource(CollisionMap::new(8, 8, 10.0));
        world.insert_resource(Notifications::default());
        let e = world
            .spawn((Position::new(12.0, 12.0), OccupiedTile::default()))
            .id();

        world.resource_scope(|world, mut map: Mut<CollisionMap>| {
            let pos = *world.get::<Position>(e).unwrap();
            let mut tile = world.get_mut::<OccupiedTile>(e).unwrap();
            map.recheck_entity(&mut tile, &pos);
        });
        assert!(world.resource::<CollisionMap>().is_occupied((1, 1)));

        let mut schedule = Schedule::default();
        schedule.add_systems(collision_update_system);
        schedule.run(&mut world);
        assert!(world.resource::<CollisionMap>().is_dirty());
        assert_eq!(world.resource_mut::<Notifications>().drain().len(), 1);
    }
}
