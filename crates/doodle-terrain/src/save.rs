//! Versioned terrain save format.
//!
//! ## Layout
//!
//! | Field | Encoding |
//! |-------|----------|
//! | Header | string `"Doodle Empires Voxel Terrain "` |
//! | Version | string, e.g. `"0.0.6"` |
//! | Width, height | `i32` little-endian each |
//! | Cells | row-major (`y` outer, `x` inner), fields per version |
//! | Zones | `i32` count, then one record per zone (0.0.4 and later) |
//!
//! Per-cell fields by version:
//!
//! | Version | Cell fields | Zone entries |
//! |---------|-------------|--------------|
//! | 0.0.1 | tile, adjacency | none |
//! | 0.0.2, 0.0.3 | tile, adjacency, meta | none |
//! | 0.0.4 | tile, adjacency, meta | rect + RGBA |
//! | 0.0.5 | tile, adjacency, meta | full record |
//! | 0.0.6 | tile, adjacency, meta, walkable | full record |
//!
//! Strings carry a 7-bit varint length prefix. Only the current version is
//! ever written; older versions decode into the same in-memory form.

use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::catalog::{TileCatalog, TileId};
use crate::generation::MapSettings;
use crate::grid::{GridError, MAX_DIMENSION};
use crate::map::TerrainMap;
use crate::walkability::SearchGrid;
use crate::zones::{ZoneInfo, ZoneRecord, read_color, read_rect};

/// Magic header string at the start of every save.
pub const SAVE_HEADER: &str = "Doodle Empires Voxel Terrain ";

/// Version tag written by [`save_map`].
pub const CURRENT_VERSION: &str = "0.0.6";

/// Name given to zones read from 0.0.4 files, which stored none.
const LEGACY_ZONE_NAME: &str = "<unknown>";

/// Errors that can occur while reading or writing a save.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with [`SAVE_HEADER`].
    #[error("not a terrain save (header {0:?})")]
    BadHeader(String),
    /// The data ended early or held an invalid value.
    #[error("corrupt save data: {0}")]
    Corrupt(#[from] BinaryError),
    #[error("invalid map dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error(transparent)]
    Grid(#[from] GridError),
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// How decoded cells become a live map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Restoration {
    /// Trust stored tiles and adjacency; derive walkability.
    KeepAdjacency,
    /// Replay every tile through the mutator; derive everything.
    ThroughMutator,
    /// Trust stored tiles, adjacency and walkability.
    Restore,
}

/// Version-independent result of decoding a save.
#[derive(Debug)]
struct DecodedMap {
    width: u32,
    height: u32,
    tiles: Vec<u8>,
    adjacency: Vec<u8>,
    meta: Vec<u8>,
    walkable: Option<Vec<bool>>,
    zones: Vec<ZoneRecord>,
    restoration: Restoration,
}

type Decoder = fn(&mut BinaryReader<'_>) -> Result<DecodedMap, SaveError>;

struct FormatVersion {
    tag: &'static str,
    decode: Decoder,
    /// Replace the map with a generated default when the data ends early.
    recover_truncation: bool,
}

const FORMATS: &[FormatVersion] = &[
    FormatVersion {
        tag: "0.0.1",
        decode: decode_v1,
        recover_truncation: false,
    },
    FormatVersion {
        tag: "0.0.2",
        decode: decode_v2,
        recover_truncation: false,
    },
    FormatVersion {
        tag: "0.0.3",
        decode: decode_v2,
        recover_truncation: false,
    },
    FormatVersion {
        tag: "0.0.4",
        decode: decode_v4,
        recover_truncation: true,
    },
    FormatVersion {
        tag: "0.0.5",
        decode: decode_v5,
        recover_truncation: true,
    },
    FormatVersion {
        tag: CURRENT_VERSION,
        decode: decode_v6,
        recover_truncation: true,
    },
];

fn decode_v1(r: &mut BinaryReader<'_>) -> Result<DecodedMap, SaveError> {
    read_cells(r, false, false, Restoration::KeepAdjacency)
}

fn decode_v2(r: &mut BinaryReader<'_>) -> Result<DecodedMap, SaveError> {
    read_cells(r, true, false, Restoration::KeepAdjacency)
}

fn decode_v4(r: &mut BinaryReader<'_>) -> Result<DecodedMap, SaveError> {
    let mut map = read_cells(r, true, false, Restoration::KeepAdjacency)?;
    let count = r.read_count()?;
    for _ in 0..count {
        let bounds = read_rect(r)?;
        let color = read_color(r)?;
        map.zones.push(ZoneRecord {
            bounds,
            owner: 0,
            info: ZoneInfo {
                color,
                name: LEGACY_ZONE_NAME.to_string(),
            },
        });
    }
    Ok(map)
}

fn decode_v5(r: &mut BinaryReader<'_>) -> Result<DecodedMap, SaveError> {
    let mut map = read_cells(r, true, false, Restoration::ThroughMutator)?;
    map.zones = read_zone_records(r)?;
    Ok(map)
}

fn decode_v6(r: &mut BinaryReader<'_>) -> Result<DecodedMap, SaveError> {
    let mut map = read_cells(r, true, true, Restoration::Restore)?;
    map.zones = read_zone_records(r)?;
    Ok(map)
}

fn read_zone_records(r: &mut BinaryReader<'_>) -> Result<Vec<ZoneRecord>, SaveError> {
    let count = r.read_count()?;
    let mut zones = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        zones.push(ZoneRecord::read(r)?);
    }
    Ok(zones)
}

fn read_cells(
    r: &mut BinaryReader<'_>,
    with_meta: bool,
    with_walkable: bool,
    restoration: Restoration,
) -> Result<DecodedMap, SaveError> {
    let width = r.read_i32()?;
    let height = r.read_i32()?;
    let valid = |v: i32| v > 0 && v as u32 <= MAX_DIMENSION;
    if !valid(width) || !valid(height) {
        return Err(SaveError::InvalidDimensions { width, height });
    }

    let cells = width as usize * height as usize;
    let stride = 2 + usize::from(with_meta) + usize::from(with_walkable);
    let needed = cells * stride;
    if needed > r.remaining() {
        return Err(BinaryError::EndOfStream {
            needed,
            remaining: r.remaining(),
        }
        .into());
    }

    let mut tiles = Vec::with_capacity(cells);
    let mut adjacency = Vec::with_capacity(cells);
    let mut meta = Vec::with_capacity(cells);
    let mut walkable = with_walkable.then(|| Vec::with_capacity(cells));
    for _ in 0..cells {
        tiles.push(r.read_u8()?);
        adjacency.push(r.read_u8()?);
        meta.push(if with_meta { r.read_u8()? } else { 0 });
        if let Some(flags) = walkable.as_mut() {
            flags.push(r.read_bool()?);
        }
    }

    Ok(DecodedMap {
        width: width as u32,
        height: height as u32,
        tiles,
        adjacency,
        meta,
        walkable,
        zones: Vec::new(),
        restoration,
    })
}

impl DecodedMap {
    fn into_map(
        self,
        catalog: Arc<TileCatalog>,
        base: &MapSettings,
    ) -> Result<TerrainMap, SaveError> {
        let settings = base.resized(self.width, self.height, base.seed);
        let mut map = TerrainMap::empty(catalog, settings)?;
        let width = self.width as usize;

        match self.restoration {
            Restoration::ThroughMutator => {
                for (i, (&tile, &meta)) in self.tiles.iter().zip(&self.meta).enumerate() {
                    let (x, y) = ((i % width) as i32, (i / width) as i32);
                    map.set_tile(x, y, TileId(tile));
                    map.set_meta(x, y, meta);
                }
            }
            Restoration::KeepAdjacency | Restoration::Restore => {
                map.grid_mut().restore(&self.tiles, &self.adjacency, &self.meta);
                match self.walkable {
                    Some(flags) if self.restoration == Restoration::Restore => {
                        let walkability = map.walkability_mut();
                        for (i, _) in flags.iter().enumerate().filter(|(_, w)| **w) {
                            let (x, y) = ((i % width) as i32, (i / width) as i32);
                            walkability.set_walkable_at(x, y, true);
                        }
                    }
                    _ => map.rebuild_walkability(),
                }
            }
        }

        for record in self.zones {
            map.zones_mut().insert(record);
        }
        map.rebase_deltas();
        Ok(map)
    }
}

/// Decodes a save held in memory.
///
/// Returns `Ok(None)` for an unknown version tag. Truncated 0.0.4+ data is
/// replaced by a map generated from `fallback` and logged as a warning. For
/// every loaded map the delta log is rebuilt against the base terrain of
/// `fallback.seed`.
pub fn decode_map(
    data: &[u8],
    catalog: Arc<TileCatalog>,
    fallback: &MapSettings,
) -> Result<Option<TerrainMap>, SaveError> {
    let mut r = BinaryReader::new(data);
    let header = r.read_str()?;
    if header != SAVE_HEADER {
        return Err(SaveError::BadHeader(header));
    }
    let version = r.read_str()?;
    let Some(format) = FORMATS.iter().find(|f| f.tag == version) else {
        tracing::warn!(%version, "unreadable terrain save version");
        return Ok(None);
    };

    match (format.decode)(&mut r) {
        Ok(decoded) => {
            let map = decoded.into_map(catalog, fallback)?;
            tracing::info!(
                %version,
                width = map.width(),
                height = map.height(),
                zones = map.zones().len(),
                "loaded terrain"
            );
            Ok(Some(map))
        }
        Err(SaveError::Corrupt(err @ BinaryError::EndOfStream { .. }))
            if format.recover_truncation =>
        {
            tracing::warn!(%version, error = %err, "terrain save truncated, generating fresh map");
            Ok(Some(TerrainMap::generate(catalog, fallback.clone())?))
        }
        Err(err) => Err(err),
    }
}

/// Reads a save from `reader`. See [`decode_map`].
pub fn load_map(
    mut reader: impl Read,
    catalog: Arc<TileCatalog>,
    fallback: &MapSettings,
) -> Result<Option<TerrainMap>, SaveError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    decode_map(&data, catalog, fallback)
}

pub fn load_from_path(
    path: &Path,
    catalog: Arc<TileCatalog>,
    fallback: &MapSettings,
) -> Result<Option<TerrainMap>, SaveError> {
    let file = std::fs::File::open(path)?;
    load_map(std::io::BufReader::new(file), catalog, fallback)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes `map` in the current version.
pub fn encode_map(map: &TerrainMap) -> Vec<u8> {
    let grid = map.grid();
    let cells = grid.tiles().len();
    let mut w = BinaryWriter::with_capacity(64 + cells * 4);
    w.write_str(SAVE_HEADER);
    w.write_str(CURRENT_VERSION);
    w.write_i32(map.width() as i32);
    w.write_i32(map.height() as i32);

    let walkability = map.walkability();
    for y in 0..map.height() as i32 {
        for x in 0..map.width() as i32 {
            w.write_u8(grid.tile(x, y).0);
            w.write_u8(grid.adjacency(x, y));
            w.write_u8(grid.meta(x, y));
            w.write_bool(walkability.is_walkable_at(x, y));
        }
    }

    let zones = map.zones();
    w.write_i32(zones.len() as i32);
    for record in zones.records() {
        record.write(&mut w);
    }
    w.into_inner()
}

pub fn save_map(map: &TerrainMap, mut writer: impl Write) -> Result<(), SaveError> {
    writer.write_all(&encode_map(map))?;
    writer.flush()?;
    Ok(())
}

/// Writes `map` to `path`, creating parent directories.
pub fn save_to_path(map: &TerrainMap, path: &Path) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    save_map(map, BufWriter::new(file))?;
    tracing::info!(path = %path.display(), "saved terrain");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::stock;
    use crate::zones::{Rgba, TileRect, WorldRect};

    fn catalog() -> Arc<TileCatalog> {
        Arc::new(TileCatalog::standard().unwrap())
    }

    fn settings() -> MapSettings {
        MapSettings {
            width: 24,
            height: 20,
            surface_row: 10,
            height_modifier: 3.0,
            seed: 5,
            ..MapSettings::default()
        }
    }

    fn sample_map() -> TerrainMap {
        let mut map = TerrainMap::generate(catalog(), settings()).unwrap();
        map.set_tile(2, 3, stock::STONE);
        map.set_tile(4, 5, stock::LADDER);
        map.set_tile(10, 18, TileId::AIR);
        map.set_meta(2, 3, 7);
        map.zones_mut().define_tiles(
            TileRect {
                min_x: 0,
                min_y: 0,
                max_x: 3,
                max_y: 2,
            },
            1,
            ZoneInfo {
                color: Rgba::new(10, 20, 30, 40),
                name: "quarry".into(),
            },
        );
        map.zones_mut().define_tiles(
            TileRect {
                min_x: 5,
                min_y: 5,
                max_x: 6,
                max_y: 9,
            },
            2,
            ZoneInfo {
                color: Rgba::WHITE,
                name: "farm".into(),
            },
        );
        map
    }

    fn legacy_header(w: &mut BinaryWriter, version: &str, width: i32, height: i32) {
        w.write_str(SAVE_HEADER);
        w.write_str(version);
        w.write_i32(width);
        w.write_i32(height);
    }

    #[test]
    fn test_current_version_round_trip() {
        let map = sample_map();
        let bytes = encode_map(&map);
        let loaded = decode_map(&bytes, catalog(), &settings()).unwrap().unwrap();

        assert_eq!(loaded.width(), map.width());
        assert_eq!(loaded.height(), map.height());
        assert_eq!(loaded.grid().tiles(), map.grid().tiles());
        assert_eq!(loaded.grid().adjacency_slice(), map.grid().adjacency_slice());
        assert_eq!(loaded.grid().meta_slice(), map.grid().meta_slice());
        assert_eq!(loaded.walkability(), map.walkability());
        assert_eq!(
            loaded.zones().records().collect::<Vec<_>>(),
            map.zones().records().collect::<Vec<_>>()
        );
        assert_eq!(loaded.zones().indices(), map.zones().indices());
    }

    #[test]
    fn test_loaded_map_deltas_replay_on_base() {
        let map = sample_map();
        let loaded = decode_map(&encode_map(&map), catalog(), &settings())
            .unwrap()
            .unwrap();
        let mut replica = TerrainMap::generate(catalog(), settings()).unwrap();
        replica.apply_changes(loaded.deltas().changes());
        assert_eq!(replica.grid().tiles(), map.grid().tiles());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps").join("world.dem");
        let map = sample_map();
        save_to_path(&map, &path).unwrap();
        let loaded = load_from_path(&path, catalog(), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.grid().tiles(), map.grid().tiles());
        assert_eq!(loaded.zones().len(), 2);
    }

    #[test]
    fn test_writer_emits_current_version() {
        let bytes = encode_map(&sample_map());
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_str().unwrap(), SAVE_HEADER);
        assert_eq!(r.read_str().unwrap(), CURRENT_VERSION);
        assert_eq!(r.read_i32().unwrap(), 24);
        assert_eq!(r.read_i32().unwrap(), 20);
    }

    #[test]
    fn test_unknown_version_returns_none() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.9", 2, 2);
        w.write_bytes(&[0; 16]);

        let catalog = catalog();
        let tiles_before = catalog.len();
        let result = decode_map(w.as_slice(), catalog.clone(), &settings()).unwrap();
        assert!(result.is_none());
        assert_eq!(Arc::strong_count(&catalog), 1);
        assert_eq!(catalog.len(), tiles_before);
    }

    #[test]
    fn test_bad_header_is_error() {
        let mut w = BinaryWriter::new();
        w.write_str("Some Other Format");
        w.write_str(CURRENT_VERSION);
        assert!(matches!(
            decode_map(w.as_slice(), catalog(), &settings()),
            Err(SaveError::BadHeader(_))
        ));
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, CURRENT_VERSION, -4, 10);
        assert!(matches!(
            decode_map(w.as_slice(), catalog(), &settings()),
            Err(SaveError::InvalidDimensions { width: -4, height: 10 })
        ));
    }

    #[test]
    fn test_v001_keeps_stored_adjacency() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.1", 2, 2);
        // (tile, adjacency) per cell; stone floor under air.
        w.write_bytes(&[0, 15, 0, 15, 2, 4, 2, 2]);

        let map = decode_map(w.as_slice(), catalog(), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(map.tile(0, 1), stock::STONE);
        assert_eq!(map.grid().adjacency(0, 1), 4);
        assert_eq!(map.grid().meta(0, 1), 0);
        assert!(map.walkability().is_walkable_at(0, 0));
        assert!(map.walkability().is_walkable_at(1, 0));
        assert!(!map.walkability().is_walkable_at(0, 1));
    }

    #[test]
    fn test_v003_reads_meta() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.3", 1, 1);
        w.write_bytes(&[2, 0, 9]);
        let map = decode_map(w.as_slice(), catalog(), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(map.grid().meta(0, 0), 9);
    }

    #[test]
    fn test_v004_legacy_zones() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.4", 1, 1);
        w.write_bytes(&[0, 15, 0]);
        w.write_i32(1);
        for v in [16, 32, 48, 64] {
            w.write_i32(v);
        }
        w.write_bytes(&[1, 2, 3, 4]);

        let map = decode_map(w.as_slice(), catalog(), &settings())
            .unwrap()
            .unwrap();
        let zone = &map.zones().zones()[0];
        assert_eq!(zone.bounds(), WorldRect::new(16, 32, 48, 64));
        assert_eq!(zone.owner(), 0);
        assert_eq!(zone.info().name, "<unknown>");
        assert_eq!(zone.info().color, Rgba::new(1, 2, 3, 4));
    }

    #[test]
    fn test_v005_derives_adjacency_through_mutator() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.5", 2, 1);
        // Garbage adjacency bytes are ignored.
        w.write_bytes(&[2, 99, 0, 2, 99, 0]);
        w.write_i32(0);

        let map = decode_map(w.as_slice(), catalog(), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(map.grid().adjacency(0, 0), map.grid().compute_adjacency_at(0, 0));
        assert_eq!(map.grid().adjacency(0, 0), crate::adjacency::RIGHT);
    }

    #[test]
    fn test_truncated_modern_save_falls_back_to_generated_map() {
        let bytes = encode_map(&sample_map());
        let truncated = &bytes[..bytes.len() - 7];
        let fallback = MapSettings {
            width: 12,
            height: 8,
            ..settings()
        };
        let map = decode_map(truncated, catalog(), &fallback)
            .unwrap()
            .unwrap();
        assert_eq!((map.width(), map.height()), (12, 8));
        assert!(map.zones().is_empty());
        assert!(map.deltas().is_empty());
    }

    #[test]
    fn test_truncated_cells_fall_back_too() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.4", 10, 10);
        w.write_bytes(&[0; 5]);
        let map = decode_map(w.as_slice(), catalog(), &settings())
            .unwrap()
            .unwrap();
        assert_eq!((map.width(), map.height()), (24, 20));
    }

    #[test]
    fn test_truncated_legacy_save_is_error() {
        let mut w = BinaryWriter::new();
        legacy_header(&mut w, "0.0.2", 4, 4);
        w.write_bytes(&[0; 5]);
        assert!(matches!(
            decode_map(w.as_slice(), catalog(), &settings()),
            Err(SaveError::Corrupt(BinaryError::EndOfStream { .. }))
        ));
    }
}
