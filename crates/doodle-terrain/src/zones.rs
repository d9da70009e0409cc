//! Rectangular player zones over the tile grid.
//!
//! Zones are stored in world units (pixels) and always snap to whole tiles.
//! Every zone owns four vertices and six indices in a parallel render buffer;
//! removing a zone re-bases the indices of every later zone so the buffer stays
//! drawable as-is.

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Axis-aligned rectangle in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorldRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl WorldRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right/bottom corner, widened so it never overflows.
    pub fn far_corner(&self) -> (i64, i64) {
        (
            i64::from(self.x) + i64::from(self.width),
            i64::from(self.y) + i64::from(self.height),
        )
    }

    /// Positive size with the far corner still inside the `i32` range.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some()
            && self.y.checked_add(self.height).is_some()
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        let (right, bottom) = self.far_corner();
        px >= self.x as f32 && px < right as f32 && py >= self.y as f32 && py < bottom as f32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    #[error("zone bounds {0:?} are empty or outside the world range")]
    InvalidBounds(WorldRect),
}

/// Inclusive-min / exclusive-max rectangle in tile units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

/// Display metadata of a zone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneInfo {
    pub color: Rgba,
    pub name: String,
}

/// Zone payload as persisted and replicated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneRecord {
    pub bounds: WorldRect,
    /// Player index of the owner.
    pub owner: u8,
    pub info: ZoneInfo,
}

impl ZoneRecord {
    /// `i32 x, y, w, h`, `u8 owner`, RGBA, name.
    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_i32(self.bounds.x);
        w.write_i32(self.bounds.y);
        w.write_i32(self.bounds.width);
        w.write_i32(self.bounds.height);
        w.write_u8(self.owner);
        write_color(w, self.info.color);
        w.write_str(&self.info.name);
    }

    pub fn read(r: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let bounds = read_rect(r)?;
        let owner = r.read_u8()?;
        let color = read_color(r)?;
        let name = r.read_str()?;
        Ok(Self {
            bounds,
            owner,
            info: ZoneInfo { color, name },
        })
    }
}

pub(crate) fn read_rect(r: &mut BinaryReader<'_>) -> Result<WorldRect, BinaryError> {
    Ok(WorldRect::new(
        r.read_i32()?,
        r.read_i32()?,
        r.read_i32()?,
        r.read_i32()?,
    ))
}

pub(crate) fn write_color(w: &mut BinaryWriter, color: Rgba) {
    w.write_bytes(&[color.r, color.g, color.b, color.a]);
}

pub(crate) fn read_color(r: &mut BinaryReader<'_>) -> Result<Rgba, BinaryError> {
    let bytes = r.read_bytes(4)?;
    Ok(Rgba::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

/// Handle of a zone inside one [`ZoneIndex`]. Not stable across processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub u32);

/// A zone in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zoning {
    pub id: ZoneId,
    pub record: ZoneRecord,
}

impl Zoning {
    pub fn bounds(&self) -> WorldRect {
        self.record.bounds
    }

    pub fn owner(&self) -> u8 {
        self.record.owner
    }

    pub fn info(&self) -> &ZoneInfo {
        &self.record.info
    }
}

/// Colored corner of a zone quad, in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneVertex {
    pub x: f32,
    pub y: f32,
    pub color: Rgba,
}

const VERTS_PER_ZONE: usize = 4;
const INDICES_PER_ZONE: usize = 6;

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Ordered list of zones plus their quad buffers.
#[derive(Clone, Debug)]
pub struct ZoneIndex {
    tile_width: i32,
    tile_height: i32,
    zones: Vec<Zoning>,
    vertices: Vec<ZoneVertex>,
    indices: Vec<u32>,
    next_id: u32,
}

impl ZoneIndex {
    /// `tile_width`/`tile_height` are the world size of one tile; zero is
    /// treated as one.
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width: tile_width.max(1) as i32,
            tile_height: tile_height.max(1) as i32,
            zones: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            next_id: 0,
        }
    }

    /// Defines a zone spanning tiles `[min, max)`.
    pub fn define_tiles(&mut self, tiles: TileRect, owner: u8, info: ZoneInfo) -> Zoning {
        let bounds = WorldRect::new(
            tiles.min_x * self.tile_width,
            tiles.min_y * self.tile_height,
            (tiles.max_x - tiles.min_x) * self.tile_width,
            (tiles.max_y - tiles.min_y) * self.tile_height,
        );
        self.insert(ZoneRecord {
            bounds,
            owner,
            info,
        })
    }

    /// Defines a zone from two opposite world-space corners, in either order.
    /// The min corner floors and the max corner ceils to tile boundaries.
    pub fn define_world(
        &mut self,
        a: (f32, f32),
        b: (f32, f32),
        owner: u8,
        info: ZoneInfo,
    ) -> Zoning {
        let tw = self.tile_width as f32;
        let th = self.tile_height as f32;
        let tiles = TileRect {
            min_x: (a.0.min(b.0) / tw).floor() as i32,
            min_y: (a.1.min(b.1) / th).floor() as i32,
            max_x: (a.0.max(b.0) / tw).ceil() as i32,
            max_y: (a.1.max(b.1) / th).ceil() as i32,
        };
        self.define_tiles(tiles, owner, info)
    }

    /// Snaps a requested record to whole tiles and appends it.
    ///
    /// Empty rectangles and rectangles whose snapped extent leaves the `i32`
    /// range are rejected without touching the index.
    pub fn define_record(&mut self, mut record: ZoneRecord) -> Result<Zoning, ZoneError> {
        record.bounds = self
            .snap(record.bounds)
            .ok_or(ZoneError::InvalidBounds(record.bounds))?;
        Ok(self.insert(record))
    }

    /// Grows `bounds` outwards to the enclosing tile boundaries.
    pub fn snap(&self, bounds: WorldRect) -> Option<WorldRect> {
        if !bounds.is_valid() {
            return None;
        }
        let tw = i64::from(self.tile_width);
        let th = i64::from(self.tile_height);
        let (right, bottom) = bounds.far_corner();
        let left = i64::from(bounds.x).div_euclid(tw) * tw;
        let top = i64::from(bounds.y).div_euclid(th) * th;
        let right = (right + tw - 1).div_euclid(tw) * tw;
        let bottom = (bottom + th - 1).div_euclid(th) * th;

        let snapped = WorldRect::new(
            i32::try_from(left).ok()?,
            i32::try_from(top).ok()?,
            i32::try_from(right - left).ok()?,
            i32::try_from(bottom - top).ok()?,
        );
        snapped.is_valid().then_some(snapped)
    }

    /// Appends an already-snapped record (loaded or replicated).
    pub fn insert(&mut self, record: ZoneRecord) -> Zoning {
        let id = ZoneId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let base = self.vertices.len() as u32;
        let bounds = record.bounds;
        let (right, bottom) = bounds.far_corner();
        let (left, top) = (bounds.x as f32, bounds.y as f32);
        let (right, bottom) = (right as f32, bottom as f32);
        let color = record.info.color;
        self.vertices.extend_from_slice(&[
            ZoneVertex { x: left, y: top, color },
            ZoneVertex { x: right, y: top, color },
            ZoneVertex { x: left, y: bottom, color },
            ZoneVertex { x: right, y: bottom, color },
        ]);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);

        let zoning = Zoning { id, record };
        self.zones.push(zoning.clone());
        zoning
    }

    /// Removes the zone with this handle.
    pub fn delete(&mut self, id: ZoneId) -> Option<Zoning> {
        let pos = self.zones.iter().position(|z| z.id == id)?;
        Some(self.remove_at(pos))
    }

    /// Removes the first zone (insertion order) containing the point.
    pub fn delete_at(&mut self, x: f32, y: f32) -> Option<Zoning> {
        let pos = self.zones.iter().position(|z| z.bounds().contains(x, y))?;
        Some(self.remove_at(pos))
    }

    fn remove_at(&mut self, pos: usize) -> Zoning {
        let first_vertex = pos * VERTS_PER_ZONE;
        let first_index = pos * INDICES_PER_ZONE;
        self.vertices
            .drain(first_vertex..first_vertex + VERTS_PER_ZONE);
        self.indices
            .drain(first_index..first_index + INDICES_PER_ZONE);
        for index in &mut self.indices[first_index..] {
            *index -= VERTS_PER_ZONE as u32;
        }
        self.zones.remove(pos)
    }

    /// First zone in insertion order whose bounds contain the point.
    pub fn find_containing(&self, x: f32, y: f32) -> Option<&Zoning> {
        self.zones.iter().find(|z| z.bounds().contains(x, y))
    }

    /// Tile-unit extent of a zone.
    pub fn tile_bounds(&self, zone: &Zoning) -> TileRect {
        let b = zone.bounds();
        let (right, bottom) = b.far_corner();
        TileRect {
            min_x: b.x.div_euclid(self.tile_width),
            min_y: b.y.div_euclid(self.tile_height),
            max_x: saturate(right.div_euclid(i64::from(self.tile_width))),
            max_y: saturate(bottom.div_euclid(i64::from(self.tile_height))),
        }
    }

    pub fn zones(&self) -> &[Zoning] {
        &self.zones
    }

    pub fn records(&self) -> impl Iterator<Item = &ZoneRecord> {
        self.zones.iter().map(|z| &z.record)
    }

    pub fn vertices(&self) -> &[ZoneVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.vertices.clear();
        self.indices.clear();
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
