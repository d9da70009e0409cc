//! Tile catalog: maps compact [`TileId`] values to [`TileDef`] metadata and
//! holds the connect-group relation used by the adjacency pass.
//!
//! The catalog is built once during startup and then shared immutably as an
//! `Arc<TileCatalog>`. Air is always ID 0 so that a zeroed grid is empty
//! terrain.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::grid::TerrainGrid;
use crate::zones::Rgba;

/// Number of addressable tile types (IDs are a single byte).
pub const MAX_TILES: usize = 256;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored in every grid cell (1 byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u8);

impl TileId {
    /// The empty tile.
    pub const AIR: TileId = TileId(0);

    /// Returns `true` for the empty tile.
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a tile is drawn. Only [`RenderType::Land`] takes part in the diagonal
/// adjacency variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderType {
    /// Not drawn at all (air).
    None,
    /// Connected terrain drawn from a 16-variant sheet plus diagonals.
    Land,
    /// Standalone sprite, no connection variants.
    Sprite,
}

/// A proposed write produced by a [`TileBehavior`] during a tick scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileEdit {
    pub x: i32,
    pub y: i32,
    pub id: TileId,
}

/// Per-tile periodic update hook.
///
/// Behaviors only read the grid and push proposals into `out`; the authority
/// applies them afterwards through the regular mutator so that tick work and
/// network edits share one write path.
pub trait TileBehavior: Send + Sync {
    fn on_tick(&self, grid: &TerrainGrid, x: i32, y: i32, out: &mut Vec<TileEdit>);
}

/// Moves the tile down one cell whenever the cell below is empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallingTile;

impl TileBehavior for FallingTile {
    fn on_tick(&self, grid: &TerrainGrid, x: i32, y: i32, out: &mut Vec<TileEdit>) {
        let below = y + 1;
        if !grid.in_bounds(x, below) || !grid.tile(x, below).is_air() {
            return;
        }
        let id = grid.tile(x, y);
        out.push(TileEdit {
            x,
            y,
            id: TileId::AIR,
        });
        out.push(TileEdit { x, y: below, id });
    }
}

/// Full descriptor for a tile type.
#[derive(Clone)]
pub struct TileDef {
    /// Lowercased on registration; lookups are case-insensitive.
    pub name: String,
    /// Index into the tile texture atlas.
    pub texture_ref: i16,
    pub render_type: RenderType,
    /// Blocks movement and supports walkers standing on top.
    pub solid: bool,
    /// Walkable regardless of what surrounds it (ladders, ropes).
    pub climbable: bool,
    /// Tint used by minimaps and debug views.
    pub color: Rgba,
    /// Optional tick hook.
    pub behavior: Option<Arc<dyn TileBehavior>>,
}

impl TileDef {
    pub fn new(
        name: impl Into<String>,
        texture_ref: i16,
        render_type: RenderType,
        solid: bool,
    ) -> Self {
        Self {
            name: name.into(),
            texture_ref,
            render_type,
            solid,
            climbable: false,
            color: Rgba::WHITE,
            behavior: None,
        }
    }

    pub fn climbable(mut self) -> Self {
        self.climbable = true;
        self
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn TileBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }
}

impl fmt::Debug for TileDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileDef")
            .field("name", &self.name)
            .field("texture_ref", &self.texture_ref)
            .field("render_type", &self.render_type)
            .field("solid", &self.solid)
            .field("climbable", &self.climbable)
            .field("color", &self.color)
            .field("ticks", &self.behavior.is_some())
            .finish()
    }
}

/// Errors that can occur while building or querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A tile with the same (case-insensitive) name is already registered.
    #[error("duplicate tile name: {0}")]
    DuplicateName(String),
    /// No tile with this name exists.
    #[error("unknown tile name: {0}")]
    NotFound(String),
    /// All 256 IDs are taken.
    #[error("tile catalog is full (max 256 types)")]
    CatalogFull,
    /// Connections involving air or unregistered IDs are rejected.
    #[error("cannot connect {0} to {1}")]
    InvalidConnection(TileId, TileId),
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Stock tile IDs produced by [`TileCatalog::standard`].
pub mod stock {
    use super::TileId;

    pub const GRASS: TileId = TileId(1);
    pub const STONE: TileId = TileId(2);
    pub const LADDER: TileId = TileId(3);
    pub const WOOD: TileId = TileId(4);
    pub const LEAVES: TileId = TileId(5);
    pub const SAND: TileId = TileId(6);
}

/// Append-only registry of tile types plus the 256×256 connect relation.
pub struct TileCatalog {
    /// Dense array where `index == TileId.0`.
    tiles: Vec<TileDef>,
    name_to_id: FxHashMap<String, TileId>,
    /// Row-major `[a * MAX_TILES + b]`.
    connections: Box<[bool]>,
}

impl TileCatalog {
    /// Creates a catalog with only air registered.
    pub fn new() -> Self {
        let air = TileDef {
            name: "air".to_string(),
            texture_ref: -1,
            render_type: RenderType::None,
            solid: false,
            climbable: false,
            color: Rgba::TRANSPARENT,
            behavior: None,
        };

        let mut name_to_id = FxHashMap::default();
        name_to_id.insert(air.name.clone(), TileId::AIR);

        let mut catalog = Self {
            tiles: vec![air],
            name_to_id,
            connections: vec![false; MAX_TILES * MAX_TILES].into_boxed_slice(),
        };
        catalog.connections[0] = true;
        catalog
    }

    /// Stock tile set: air, grass, stone, ladder, wood, leaves, sand.
    pub fn standard() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        let grass = catalog.register(
            TileDef::new("Grass", 0, RenderType::Land, true)
                .with_color(Rgba::new(86, 160, 56, 255)),
        )?;
        let stone = catalog.register(
            TileDef::new("Stone", 1, RenderType::Land, true)
                .with_color(Rgba::new(128, 128, 128, 255)),
        )?;
        catalog.register(
            TileDef::new("Ladder", 2, RenderType::Sprite, false)
                .climbable()
                .with_color(Rgba::new(150, 110, 60, 255)),
        )?;
        catalog.register(
            TileDef::new("Wood", 3, RenderType::Land, true).with_color(Rgba::new(110, 70, 30, 255)),
        )?;
        catalog.register(
            TileDef::new("Leaves", 4, RenderType::Land, false)
                .with_color(Rgba::new(40, 120, 30, 255)),
        )?;
        let sand = catalog.register(
            TileDef::new("Sand", 5, RenderType::Land, true)
                .with_color(Rgba::new(220, 200, 130, 255))
                .with_behavior(Arc::new(FallingTile)),
        )?;
        catalog.register_connection(grass, stone)?;
        catalog.register_connection(grass, sand)?;
        Ok(catalog)
    }

    /// Registers a new tile type and returns its assigned ID.
    ///
    /// IDs are assigned sequentially (the current count). The new tile always
    /// connects to itself.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateName`] if the lowercased name already exists,
    /// [`CatalogError::CatalogFull`] once all 256 IDs are used.
    pub fn register(&mut self, mut def: TileDef) -> Result<TileId, CatalogError> {
        def.name = def.name.to_lowercase();
        if self.name_to_id.contains_key(&def.name) {
            return Err(CatalogError::DuplicateName(def.name));
        }
        if self.tiles.len() >= MAX_TILES {
            return Err(CatalogError::CatalogFull);
        }

        let id = TileId(self.tiles.len() as u8);
        tracing::debug!(name = %def.name, %id, "registered tile");
        self.name_to_id.insert(def.name.clone(), id);
        self.tiles.push(def);
        self.set_connected(id, id);
        Ok(id)
    }

    /// Makes `a` and `b` connect in both directions.
    pub fn register_connection(&mut self, a: TileId, b: TileId) -> Result<(), CatalogError> {
        self.check_connectable(a, b)?;
        self.set_connected(a, b);
        self.set_connected(b, a);
        Ok(())
    }

    /// Makes `a` connect to `b` without the reverse.
    pub fn register_one_way_connection(
        &mut self,
        a: TileId,
        b: TileId,
    ) -> Result<(), CatalogError> {
        self.check_connectable(a, b)?;
        self.set_connected(a, b);
        Ok(())
    }

    fn check_connectable(&self, a: TileId, b: TileId) -> Result<(), CatalogError> {
        if a.is_air() || b.is_air() || !self.contains(a) || !self.contains(b) {
            return Err(CatalogError::InvalidConnection(a, b));
        }
        Ok(())
    }

    fn set_connected(&mut self, a: TileId, b: TileId) {
        self.connections[a.0 as usize * MAX_TILES + b.0 as usize] = true;
    }

    /// Whether a cell of type `a` visually continues into a neighbor of type `b`.
    #[inline]
    pub fn can_connect(&self, a: TileId, b: TileId) -> bool {
        self.connections[a.0 as usize * MAX_TILES + b.0 as usize]
    }

    /// Returns the definition for `id`, or `None` for IDs never registered
    /// (possible when a save file references a newer tile set).
    pub fn get(&self, id: TileId) -> Option<&TileDef> {
        self.tiles.get(id.0 as usize)
    }

    pub fn contains(&self, id: TileId) -> bool {
        (id.0 as usize) < self.tiles.len()
    }

    pub fn is_solid(&self, id: TileId) -> bool {
        self.get(id).is_some_and(|def| def.solid)
    }

    pub fn is_climbable(&self, id: TileId) -> bool {
        self.get(id).is_some_and(|def| def.climbable)
    }

    pub fn render_type(&self, id: TileId) -> RenderType {
        self.get(id).map_or(RenderType::None, |def| def.render_type)
    }

    pub fn behavior(&self, id: TileId) -> Option<&Arc<dyn TileBehavior>> {
        self.get(id).and_then(|def| def.behavior.as_ref())
    }

    /// Returns `true` if any registered tile has a tick hook.
    pub fn has_behaviors(&self) -> bool {
        self.tiles.iter().any(|def| def.behavior.is_some())
    }

    pub fn name_of(&self, id: TileId) -> Option<&str> {
        self.get(id).map(|def| def.name.as_str())
    }

    /// Case-insensitive exact-name lookup.
    pub fn lookup_by_name(&self, name: &str) -> Result<TileId, CatalogError> {
        self.name_to_id
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Number of registered types (including air).
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.tiles.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileDef)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, def)| (TileId(i as u8), def))
    }
}

impl Default for TileCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
