//! Dense tile grid with per-cell metadata and cached adjacency.
//!
//! Three parallel row-major arrays (`y * width + x`) hold the tile ID, the
//! tile-specific metadata byte and the adjacency byte. Coordinates outside the
//! grid read as air and ignore writes so that neighbor rings near the edge need
//! no special-casing.

use std::sync::Arc;

use crate::adjacency::compute_adjacency;
use crate::catalog::{TileCatalog, TileId};

/// Largest width or height a grid may have; coordinates must fit in `i16`
/// for the replication format.
pub const MAX_DIMENSION: u32 = i16::MAX as u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid grid dimensions {width}x{height} (each must be 1..=32767)")]
    InvalidDimensions { width: u32, height: u32 },
}

/// The tile layer of a map. Dimensions are fixed at construction.
#[derive(Clone)]
pub struct TerrainGrid {
    catalog: Arc<TileCatalog>,
    width: u32,
    height: u32,
    tiles: Vec<TileId>,
    meta: Vec<u8>,
    adjacency: Vec<u8>,
}

impl std::fmt::Debug for TerrainGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl TerrainGrid {
    /// Creates an all-air grid with up-to-date adjacency.
    pub fn new(catalog: Arc<TileCatalog>, width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(GridError::InvalidDimensions { width, height });
        }
        let len = width as usize * height as usize;
        let mut grid = Self {
            catalog,
            width,
            height,
            tiles: vec![TileId::AIR; len],
            meta: vec![0; len],
            adjacency: vec![0; len],
        };
        grid.recompute_all();
        Ok(grid)
    }

    pub fn catalog(&self) -> &Arc<TileCatalog> {
        &self.catalog
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.in_bounds(x, y)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    /// Tile at `(x, y)`, air when out of bounds.
    #[inline]
    pub fn tile(&self, x: i32, y: i32) -> TileId {
        self.index(x, y).map_or(TileId::AIR, |i| self.tiles[i])
    }

    /// Metadata byte at `(x, y)`, 0 when out of bounds.
    pub fn meta(&self, x: i32, y: i32) -> u8 {
        self.index(x, y).map_or(0, |i| self.meta[i])
    }

    /// Cached adjacency byte at `(x, y)`, 0 when out of bounds.
    pub fn adjacency(&self, x: i32, y: i32) -> u8 {
        self.index(x, y).map_or(0, |i| self.adjacency[i])
    }

    /// Writes a tile and refreshes the adjacency of the cell and its eight
    /// neighbors (one ring, no further).
    ///
    /// Returns `false` for out-of-bounds coordinates, which leave the grid
    /// untouched.
    pub fn set_tile(&mut self, x: i32, y: i32, id: TileId) -> bool {
        let Some(i) = self.index(x, y) else {
            tracing::debug!(x, y, %id, "ignored out-of-bounds tile write");
            return false;
        };
        if self.tiles[i] != id {
            self.tiles[i] = id;
            self.refresh_ring(x, y);
        }
        true
    }

    /// Writes the metadata byte. Out-of-bounds writes are ignored.
    pub fn set_meta(&mut self, x: i32, y: i32, value: u8) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.meta[i] = value;
                true
            }
            None => false,
        }
    }

    /// Reference adjacency for `(x, y)` computed from the current tiles.
    pub fn compute_adjacency_at(&self, x: i32, y: i32) -> u8 {
        compute_adjacency(&self.catalog, x, y, |nx, ny| self.tile(nx, ny))
    }

    fn refresh_ring(&mut self, x: i32, y: i32) {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if let Some(i) = self.index(nx, ny) {
                    self.adjacency[i] = self.compute_adjacency_at(nx, ny);
                }
            }
        }
    }

    /// Recomputes adjacency for every cell.
    pub fn recompute_all(&mut self) {
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let i = y as usize * self.width as usize + x as usize;
                self.adjacency[i] = self.compute_adjacency_at(x, y);
            }
        }
    }

    /// Clears every array back to air / zero without reallocating.
    pub fn reset(&mut self) {
        self.tiles.fill(TileId::AIR);
        self.meta.fill(0);
        self.recompute_all();
    }

    /// Writes a tile without touching adjacency. Callers must follow up with
    /// [`recompute_all`](Self::recompute_all).
    pub(crate) fn write_raw(&mut self, x: i32, y: i32, id: TileId) {
        if let Some(i) = self.index(x, y) {
            self.tiles[i] = id;
        }
    }

    /// Overwrites all three arrays from decoded data of matching length.
    pub(crate) fn restore(&mut self, tiles: &[u8], adjacency: &[u8], meta: &[u8]) {
        for (dst, &src) in self.tiles.iter_mut().zip(tiles) {
            *dst = TileId(src);
        }
        self.adjacency.copy_from_slice(adjacency);
        self.meta.copy_from_slice(meta);
    }

    /// Read-only row-major tile IDs for renderers and encoders.
    pub fn tiles(&self) -> &[TileId] {
        &self.tiles
    }

    pub fn meta_slice(&self) -> &[u8] {
        &self.meta
    }

    pub fn adjacency_slice(&self) -> &[u8] {
        &self.adjacency
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
