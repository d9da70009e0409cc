//! Tile terrain for Doodle Empires: a fixed-size 2D grid of tile bytes with
//! cached adjacency, the walkability surface derived from it, the delta log
//! used for replication, rectangular zones, and the versioned save format.
//!
//! All mutation funnels through [`TerrainMap::set_tile`], which runs the grid
//! write, the adjacency ring, the walkability cascade and the delta append in
//! that order.

pub mod adjacency;
pub mod binary;
pub mod catalog;
pub mod delta;
pub mod generation;
pub mod grid;
pub mod map;
pub mod save;
pub mod walkability;
pub mod zones;

pub use adjacency::compute_adjacency;
pub use binary::{BinaryError, BinaryReader, BinaryWriter};
pub use catalog::{
    CatalogError, FallingTile, MAX_TILES, RenderType, TileBehavior, TileCatalog, TileDef, TileEdit,
    TileId, stock,
};
pub use delta::{DeltaChange, DeltaLog};
pub use generation::MapSettings;
pub use grid::{GridError, MAX_DIMENSION, TerrainGrid};
pub use map::TerrainMap;
pub use save::{
    CURRENT_VERSION, SAVE_HEADER, SaveError, decode_map, encode_map, load_from_path, load_map,
    save_map, save_to_path,
};
pub use walkability::{GridPos, SearchGrid, SearchNode, WalkabilityGrid, is_walkable_by_rule};
pub use zones::{
    Rgba, TileRect, WorldRect, ZoneError, ZoneId, ZoneIndex, ZoneInfo, ZoneRecord, ZoneVertex,
    Zoning,
};
