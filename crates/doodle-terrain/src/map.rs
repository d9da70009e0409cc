//! The orchestrating mutator that keeps tiles, adjacency, walkability, the
//! delta log and zones of one map consistent.

use std::ops::Range;
use std::sync::Arc;

use crate::catalog::{TileCatalog, TileEdit, TileId};
use crate::delta::{DeltaChange, DeltaLog};
use crate::generation::MapSettings;
use crate::grid::{GridError, TerrainGrid};
use crate::walkability::WalkabilityGrid;
use crate::zones::ZoneIndex;

/// One game session's terrain.
///
/// [`set_tile`](Self::set_tile) is the only tile write path after
/// construction: grid write, adjacency ring, walkability cascade, delta
/// append.
#[derive(Clone, Debug)]
pub struct TerrainMap {
    settings: MapSettings,
    grid: TerrainGrid,
    walkability: WalkabilityGrid,
    deltas: DeltaLog,
    zones: ZoneIndex,
}

impl TerrainMap {
    /// An all-air map of the given size. Nothing is walkable.
    pub fn empty(catalog: Arc<TileCatalog>, settings: MapSettings) -> Result<Self, GridError> {
        let grid = TerrainGrid::new(catalog, settings.width, settings.height)?;
        let zones = ZoneIndex::new(settings.tile_width, settings.tile_height);
        Ok(Self {
            settings,
            grid,
            walkability: WalkabilityGrid::new(),
            deltas: DeltaLog::new(),
            zones,
        })
    }

    /// A map filled with the seeded base terrain and an empty delta log.
    pub fn generate(catalog: Arc<TileCatalog>, settings: MapSettings) -> Result<Self, GridError> {
        let mut map = Self::empty(catalog, settings)?;
        let tiles = map.settings.base_tiles();
        let width = map.settings.width as usize;
        for (i, &id) in tiles.iter().enumerate() {
            map.grid.write_raw((i % width) as i32, (i / width) as i32, id);
        }
        map.grid.recompute_all();
        map.rebuild_walkability();
        tracing::info!(
            width = map.settings.width,
            height = map.settings.height,
            seed = map.settings.seed,
            "generated terrain"
        );
        Ok(map)
    }

    /// Writes a tile through the full pipeline.
    ///
    /// Returns `false` (and changes nothing) out of bounds. Writing the value
    /// already present succeeds without logging a delta.
    pub fn set_tile(&mut self, x: i32, y: i32, id: TileId) -> bool {
        let previous = self.grid.tile(x, y);
        if !self.grid.set_tile(x, y, id) {
            return false;
        }
        if previous != id {
            self.walkability.update(&self.grid, x, y, true);
            // In-bounds coordinates fit in i16, see `MAX_DIMENSION`.
            self.deltas.push(DeltaChange::new(x as i16, y as i16, id));
        }
        true
    }

    /// Writes the metadata byte of a cell. Metadata does not affect
    /// adjacency or walkability and is not replicated.
    pub fn set_meta(&mut self, x: i32, y: i32, value: u8) -> bool {
        self.grid.set_meta(x, y, value)
    }

    /// Replays changes in order through [`set_tile`](Self::set_tile).
    pub fn apply_changes(&mut self, changes: &[DeltaChange]) {
        for change in changes {
            self.set_tile(i32::from(change.x), i32::from(change.y), change.id);
        }
    }

    /// Runs tick behaviors for every cell in `rows` and applies what they
    /// propose. Proposals are collected against the state before the slice and
    /// applied afterwards. Returns the changes actually made.
    pub fn tick_rows(&mut self, rows: Range<u32>) -> Vec<DeltaChange> {
        let catalog = Arc::clone(self.grid.catalog());
        let mut proposals: Vec<TileEdit> = Vec::new();
        let end = rows.end.min(self.settings.height);
        for y in rows.start..end {
            for x in 0..self.settings.width {
                let (x, y) = (x as i32, y as i32);
                if let Some(behavior) = catalog.behavior(self.grid.tile(x, y)) {
                    behavior.on_tick(&self.grid, x, y, &mut proposals);
                }
            }
        }

        let before = self.deltas.len();
        for edit in proposals {
            self.set_tile(edit.x, edit.y, edit.id);
        }
        self.deltas.since(before).to_vec()
    }

    /// Applies the walkability rule to every cell.
    pub fn rebuild_walkability(&mut self) {
        self.walkability.rebuild(&self.grid);
    }

    /// Replaces the delta log with the difference between the current tiles
    /// and the seed-generated base map, in row-major order.
    ///
    /// Maps restored from disk carry no history; after this call replaying the
    /// log on a freshly generated base reproduces them exactly.
    pub fn rebase_deltas(&mut self) {
        let base = self.settings.base_tiles();
        self.deltas.clear();
        let width = self.settings.width as usize;
        for (i, (&current, &original)) in self.grid.tiles().iter().zip(&base).enumerate() {
            if current != original {
                self.deltas.push(DeltaChange::new(
                    (i % width) as i16,
                    (i / width) as i16,
                    current,
                ));
            }
        }
    }

    pub fn catalog(&self) -> &Arc<TileCatalog> {
        self.grid.catalog()
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    pub fn seed(&self) -> i32 {
        self.settings.seed
    }

    pub fn tile(&self, x: i32, y: i32) -> TileId {
        self.grid.tile(x, y)
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    pub fn walkability(&self) -> &WalkabilityGrid {
        &self.walkability
    }

    pub fn deltas(&self) -> &DeltaLog {
        &self.deltas
    }

    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut ZoneIndex {
        &mut self.zones
    }

    /// Clears tiles, walkability, deltas and zones, keeping the size.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.walkability.clear();
        self.deltas.clear();
        self.zones.clear();
    }

    pub(crate) fn grid_mut(&mut self) -> &mut TerrainGrid {
        &mut self.grid
    }

    pub(crate) fn walkability_mut(&mut self) -> &mut WalkabilityGrid {
        &mut self.walkability
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
