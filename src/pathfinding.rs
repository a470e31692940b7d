//! Pathfinding adapter fed by the collision map.
//!
//! The adapter keeps its own copy of the occupancy matrix and refreshes it
//! whenever the collision map reports a change. Search is a plain 4-connected
//! breadth-first walk over acceptable tiles.

use crate::collision::CollisionMap;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;
use tracing::debug;

/// Tile values a path may cross. `0` marks a free tile.
pub const ACCEPTABLE_TILES: [u8; 1] = [0];

#[derive(Resource, Debug, Clone, Default)]
pub struct PathfindingGrid {
    tiles: Vec<Vec<u8>>,
    revision: u64,
}

impl PathfindingGrid {
    /// Replace the search grid with a boolean occupancy matrix.
    pub fn set_grid(&mut self, matrix: &[Vec<bool>]) {
        self.tiles = matrix
            .iter()
            .map(|row| row.iter().map(|&blocked| u8::from(blocked)).collect())
            .collect();
        self.revision += 1;
    }

    /// Number of grid refreshes received.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn width(&self) -> usize {
        self.tiles.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_acceptable(&self, (x, y): (usize, usize)) -> bool {
        self.tiles
            .get(y)
            .and_then(|row| row.get(x))
            .is_some_and(|tile| ACCEPTABLE_TILES.contains(tile))
    }

    /// Shortest 4-connected path from `start` to `goal`, both inclusive.
    ///
    /// The start and goal tiles may be occupied (the mover itself and its
    /// destination entity usually are); every tile in between must be free.
    pub fn find_path(&self, start: (usize, usize), goal: (usize, usize)) -> Option<Vec<(usize, usize)>> {
        let (width, height) = (self.width(), self.height());
        if start.0 >= width || start.1 >= height || goal.0 >= width || goal.1 >= height {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let index = |(x, y): (usize, usize)| y * width + x;
        let mut came_from: Vec<Option<(usize, usize)>> = vec![None; width * height];
        let mut seen = vec![false; width * height];
        let mut frontier = VecDeque::from([start]);
        seen[index(start)] = true;

        while let Some(current) = frontier.pop_front() {
            let (x, y) = current;
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for next in neighbours {
                if next.0 >= width || next.1 >= height || seen[index(next)] {
                    continue;
                }
                if next != goal && !self.is_acceptable(next) {
                    continue;
                }
                seen[index(next)] = true;
                came_from[index(next)] = Some(current);
                if next == goal {
                    let mut path = vec![goal];
                    let mut step = current;
                    while step != start {
                        path.push(step);
                        step = came_from[index(step)]?;
                    }
                    path.push(start);
                    path.reverse();
                    return Some(path);
                }
                frontier.push_back(next);
            }
        }
        None
    }
}

/// Copies the occupancy matrix into the pathfinding grid when it changed.
pub fn pathfinding_sync_system(map: Res<CollisionMap>, mut grid: ResMut<PathfindingGrid>) {
    if map.is_dirty() || grid.revision() == 0 {
        grid.set_grid(&map.matrix());
        debug!(revision = grid.revision(), "pathfinding grid refreshed");
    }
}
