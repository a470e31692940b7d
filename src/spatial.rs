//! Spatial partitioning for proximity queries.
//!
//! A region quadtree rebuilt from scratch every tick. `retrieve` answers with
//! a superset of the entries near the query rectangle; callers filter by true
//! distance.
//!
//! Entries that straddle a split line stay in the parent node, and entries
//! outside the root bounds stay in the root, so a query never misses an entry
//! whose bounds intersect it.

use crate::components::{Definition, Hibernated, Position};
use crate::config::SimClock;
use bevy_ecs::prelude::*;

/// Axis-aligned rectangle, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle centred on `(cx, cy)` with the given half extents.
    pub fn centered(cx: f32, cy: f32, half_width: f32, half_height: f32) -> Self {
        Self {
            x: cx - half_width,
            y: cy - half_height,
            width: half_width * 2.0,
            height: half_height * 2.0,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Edges count as overlapping.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Entry stored in the quadtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub x: f32,
    pub y: f32,
    pub bounds: Rect,
}

impl SpatialEntry {
    pub fn new(entity: Entity, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            entity,
            x,
            y,
            bounds: Rect::centered(x, y, width / 2.0, height / 2.0),
        }
    }
}

#[derive(Debug)]
struct Node {
    bounds: Rect,
    level: usize,
    entries: Vec<SpatialEntry>,
    children: Option<Box<[Node; 4]>>,
}

impl Node {
    fn new(bounds: Rect, level: usize) -> Self {
        Self {
            bounds,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    fn quadrants(&self) -> [Rect; 4] {
        let half_w = self.bounds.width / 2.0;
        let half_h = self.bounds.height / 2.0;
        let (x, y) = (self.bounds.x, self.bounds.y);
        [
            Rect::new(x + half_w, y, half_w, half_h),
            Rect::new(x, y, half_w, half_h),
            Rect::new(x, y + half_h, half_w, half_h),
            Rect::new(x + half_w, y + half_h, half_w, half_h),
        ]
    }

    /// Quadrant that fully contains `rect`, if any.
    fn quadrant_for(&self, rect: &Rect) -> Option<usize> {
        self.quadrants().iter().position(|q| q.contains(rect))
    }

    fn split(&mut self) {
        let level = self.level + 1;
        let [ne, nw, sw, se] = self.quadrants();
        self.children = Some(Box::new([
            Node::new(ne, level),
            Node::new(nw, level),
            Node::new(sw, level),
            Node::new(se, level),
        ]));
    }

    fn insert(&mut self, entry: SpatialEntry, max_objects: usize, max_levels: usize) {
        if self.children.is_some() {
            let quadrant = self.quadrant_for(&entry.bounds);
            match (quadrant, self.children.as_mut()) {
                (Some(i), Some(children)) => children[i].insert(entry, max_objects, max_levels),
                _ => self.entries.push(entry),
            }
            return;
        }

        self.entries.push(entry);
        if self.entries.len() <= max_objects || self.level >= max_levels {
            return;
        }

        self.split();
        let pending = std::mem::take(&mut self.entries);
        for entry in pending {
            let quadrant = self.quadrant_for(&entry.bounds);
            match (quadrant, self.children.as_mut()) {
                (Some(i), Some(children)) => children[i].insert(entry, max_objects, max_levels),
                _ => self.entries.push(entry),
            }
        }
    }

    fn retrieve(&self, area: &Rect, out: &mut Vec<SpatialEntry>) {
        out.extend_from_slice(&self.entries);
        if let Some(children) = &self.children {
            for child in children.iter() {
                if child.bounds.intersects(area) {
                    child.retrieve(area, out);
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match &self.children {
            Some(children) => 1 + children.iter().map(Node::depth).max().unwrap_or(0),
            None => 1,
        }
    }
}

/// Region quadtree over the whole map.
#[derive(Resource, Debug)]
pub struct QuadTree {
    root: Node,
    max_objects: usize,
    max_levels: usize,
    len: usize,
    built_for: Option<u64>,
}

impl QuadTree {
    pub fn new(bounds: Rect, max_objects: usize, max_levels: usize) -> Self {
        Self {
            root: Node::new(bounds, 0),
            max_objects: max_objects.max(1),
            max_levels,
            len: 0,
            built_for: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.root.bounds
    }

    /// Discard every entry.
    pub fn clear(&mut self) {
        self.root = Node::new(self.root.bounds, 0);
        self.len = 0;
        self.built_for = None;
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        self.root.insert(entry, self.max_objects, self.max_levels);
        self.len += 1;
    }

    /// Candidates that may intersect `area`.
    pub fn retrieve(&self, area: &Rect) -> Vec<SpatialEntry> {
        let mut out = Vec::new();
        self.root.retrieve(area, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels currently in use.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn mark_built(&mut self, tick: u64) {
        self.built_for = Some(tick);
    }

    /// Whether the tree was rebuilt during `tick`.
    pub fn is_built_for(&self, tick: u64) -> bool {
        self.built_for == Some(tick)
    }
}

/// Rebuilds the quadtree from every non-hibernated entity.
pub fn spatial_index_update_system(
    mut index: ResMut<QuadTree>,
    clock: Res<SimClock>,
    query: Query<(Entity, &Position, &Definition), Without<Hibernated>>,
) {
    index.clear();
    for (entity, pos, definition) in query.iter() {
        let footprint = definition.footprint;
        index.insert(SpatialEntry::new(entity, pos.x, pos.y, footprint.width, footprint.height));
    }
    index.mark_built(clock.tick);
}
