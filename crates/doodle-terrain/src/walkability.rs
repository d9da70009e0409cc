//! Walkability surface consumed by path search.
//!
//! A cell is walkable when it is climbable, or when it is passable (air or
//! any non-solid tile) with solid or climbable footing below and no solid
//! tile above. The grid is sparse: a coordinate is walkable iff it is a key in
//! the node map, and each node carries the bookkeeping a path search needs.

use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::grid::TerrainGrid;

/// Walkability rule for a single cell, evaluated against the current tiles.
pub fn is_walkable_by_rule(grid: &TerrainGrid, x: i32, y: i32) -> bool {
    let catalog = grid.catalog();
    let id = grid.tile(x, y);
    if catalog.is_climbable(id) {
        return true;
    }
    if catalog.is_solid(id) {
        return false;
    }
    let below = grid.tile(x, y + 1);
    let above = grid.tile(x, y - 1);
    (catalog.is_solid(below) || catalog.is_climbable(below)) && !catalog.is_solid(above)
}

/// The surface a path search is allowed to see.
pub trait SearchGrid {
    fn is_walkable_at(&self, x: i32, y: i32) -> bool;
    /// Horizontal span between the extremal walkable cells.
    fn width(&self) -> i32;
    /// Vertical span between the extremal walkable cells.
    fn height(&self) -> i32;
    /// Clears per-node search state, keeping walkability.
    fn reset(&mut self);
    fn clone_grid(&self) -> Self
    where
        Self: Sized;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Per-node A* bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SearchNode {
    pub g: f32,
    pub h: f32,
    pub f: f32,
    pub opened: bool,
    pub closed: bool,
    pub parent: Option<GridPos>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bounds {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl Bounds {
    fn point(p: GridPos) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    fn extend(&mut self, p: GridPos) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    fn touches(&self, p: GridPos) -> bool {
        p.x == self.min_x || p.x == self.max_x || p.y == self.min_y || p.y == self.max_y
    }
}

/// Sparse walkability grid with lazily maintained bounds.
///
/// Inserting a key extends the bounds in place. Removing a key that sits on
/// any edge of the bounds only marks them dirty; they are rebuilt from the key
/// set on the next [`width`](SearchGrid::width)/[`height`](SearchGrid::height)
/// query.
#[derive(Clone, Debug, Default)]
pub struct WalkabilityGrid {
    nodes: FxHashMap<GridPos, SearchNode>,
    bounds: Cell<Option<Bounds>>,
    bounds_dirty: Cell<bool>,
}

impl WalkabilityGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_walkable_at(&mut self, x: i32, y: i32, walkable: bool) {
        let pos = GridPos::new(x, y);
        if walkable {
            if self.nodes.contains_key(&pos) {
                return;
            }
            self.nodes.insert(pos, SearchNode::default());
            if !self.bounds_dirty.get() {
                let bounds = match self.bounds.get() {
                    Some(mut b) => {
                        b.extend(pos);
                        b
                    }
                    None => Bounds::point(pos),
                };
                self.bounds.set(Some(bounds));
            }
        } else if self.nodes.remove(&pos).is_some()
            && !self.bounds_dirty.get()
            && self.bounds.get().is_some_and(|b| b.touches(pos))
        {
            self.bounds_dirty.set(true);
        }
    }

    /// Re-evaluates the rule at `(x, y)`. With `cascade`, also re-evaluates the
    /// cells directly above and below, one level only.
    ///
    /// Cells outside the terrain are never marked walkable.
    pub fn update(&mut self, grid: &TerrainGrid, x: i32, y: i32, cascade: bool) {
        if grid.in_bounds(x, y) {
            let walkable = is_walkable_by_rule(grid, x, y);
            self.set_walkable_at(x, y, walkable);
        }
        if cascade {
            self.update(grid, x, y - 1, false);
            self.update(grid, x, y + 1, false);
        }
    }

    /// Applies the rule to every cell of `grid`, discarding previous state.
    pub fn rebuild(&mut self, grid: &TerrainGrid) {
        self.clear();
        for y in 0..grid.height() as i32 {
            for x in 0..grid.width() as i32 {
                if is_walkable_by_rule(grid, x, y) {
                    self.set_walkable_at(x, y, true);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.bounds.set(None);
        self.bounds_dirty.set(false);
    }

    pub fn node(&self, x: i32, y: i32) -> Option<&SearchNode> {
        self.nodes.get(&GridPos::new(x, y))
    }

    pub fn node_mut(&mut self, x: i32, y: i32) -> Option<&mut SearchNode> {
        self.nodes.get_mut(&GridPos::new(x, y))
    }

    /// Number of walkable cells.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn current_bounds(&self) -> Option<Bounds> {
        if self.bounds_dirty.get() {
            let mut keys = self.nodes.keys();
            let rebuilt = keys.next().map(|&first| {
                let mut b = Bounds::point(first);
                for &p in keys {
                    b.extend(p);
                }
                b
            });
            self.bounds.set(rebuilt);
            self.bounds_dirty.set(false);
        }
        self.bounds.get()
    }
}

impl SearchGrid for WalkabilityGrid {
    fn is_walkable_at(&self, x: i32, y: i32) -> bool {
        self.nodes.contains_key(&GridPos::new(x, y))
    }

    fn width(&self) -> i32 {
        self.current_bounds().map_or(0, |b| b.max_x - b.min_x)
    }

    fn height(&self) -> i32 {
        self.current_bounds().map_or(0, |b| b.max_y - b.min_y)
    }

    fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            *node = SearchNode::default();
        }
    }

    fn clone_grid(&self) -> Self {
        self.clone()
    }
}

impl PartialEq for WalkabilityGrid {
    fn eq(&self, other: &Self) -> bool {
        self.nodes.len() == other.nodes.len()
            && self.nodes.keys().all(|k| other.nodes.contains_key(k))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
