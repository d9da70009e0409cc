//! Seeded base-terrain generation.
//!
//! Both the server and every client derive the same base map from
//! `(width, height, seed)` plus the shared surface parameters, so only the
//! edits made after generation ever travel over the network.

use noise::{NoiseFn, Perlin};

use crate::catalog::{TileId, stock};

/// Parameters of a map: its size, its tile size in world units, and the
/// inputs of the base-terrain generator.
#[derive(Clone, Debug, PartialEq)]
pub struct MapSettings {
    pub width: u32,
    pub height: u32,
    /// World units per tile, horizontally.
    pub tile_width: u32,
    /// World units per tile, vertically.
    pub tile_height: u32,
    /// Row the surface undulates around.
    pub surface_row: i32,
    /// Scale applied to the noise sample, in rows.
    pub height_modifier: f64,
    pub seed: i32,
    /// Tile filling the first `soil_depth` rows below the surface.
    pub soil: TileId,
    pub soil_depth: i32,
    /// Tile filling everything deeper.
    pub rock: TileId,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            tile_width: 16,
            tile_height: 16,
            surface_row: 200,
            height_modifier: 25.0,
            seed: 0,
            soil: stock::GRASS,
            soil_depth: 4,
            rock: stock::STONE,
        }
    }
}

impl MapSettings {
    /// Same generator parameters with a different size and seed.
    pub fn resized(&self, width: u32, height: u32, seed: i32) -> Self {
        Self {
            width,
            height,
            seed,
            ..self.clone()
        }
    }

    /// Surface row for every column. Cells strictly below it are filled.
    pub fn surface_rows(&self) -> Vec<i32> {
        let perlin = Perlin::new(self.seed as u32);
        (0..self.width)
            .map(|x| {
                let sample = perlin.get([f64::from(x) / 16.0, 0.5]).clamp(-1.0, 1.0);
                self.surface_row + (sample * self.height_modifier).round() as i32
            })
            .collect()
    }

    /// Row-major base tiles for this map.
    pub fn base_tiles(&self) -> Vec<TileId> {
        let surface = self.surface_rows();
        let width = self.width as usize;
        let mut tiles = vec![TileId::AIR; width * self.height as usize];
        for (x, &top) in surface.iter().enumerate() {
            for y in (top + 1).max(0)..self.height as i32 {
                tiles[y as usize * width + x] = if y - top <= self.soil_depth {
                    self.soil
                } else {
                    self.rock
                };
            }
        }
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: i32) -> MapSettings {
        MapSettings {
            width: 64,
            height: 48,
            surface_row: 20,
            height_modifier: 6.0,
            seed,
            ..MapSettings::default()
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(small(42).base_tiles(), small(42).base_tiles());
    }

    #[test]
    fn test_surface_stays_within_modifier() {
        let settings = small(7);
        for row in settings.surface_rows() {
            assert!((14..=26).contains(&row), "surface row {row} out of range");
        }
    }

    #[test]
    fn test_column_layers() {
        let settings = small(3);
        let tiles = settings.base_tiles();
        let top = settings.surface_rows()[10];
        let at = |y: i32| tiles[y as usize * 64 + 10];
        assert_eq!(at(top), TileId::AIR);
        assert_eq!(at(top + 1), stock::GRASS);
        assert_eq!(at(top + 4), stock::GRASS);
        assert_eq!(at(top + 5), stock::STONE);
        assert_eq!(at(47), stock::STONE);
    }

    #[test]
    fn test_surface_below_grid_yields_air() {
        let settings = MapSettings {
            width: 16,
            height: 16,
            ..MapSettings::default()
        };
        assert!(settings.base_tiles().iter().all(|t| t.is_air()));
    }

    #[test]
    fn test_resized_keeps_generator_parameters() {
        let settings = small(1).resized(10, 12, 99);
        assert_eq!((settings.width, settings.height, settings.seed), (10, 12, 99));
        assert_eq!(settings.surface_row, 20);
    }
}
