//! Adjacency byte computation.
//!
//! Each cell caches a byte telling the renderer which variant to draw. The
//! plain form is a 4-bit mask of connecting orthogonal neighbors. Land tiles
//! may instead take one of four diagonal variants (`DIAGONAL + 0..=3`) when two
//! adjacent sides are open and the two opposite sides connect.
//!
//! The y axis points down: `y - 1` is the cell above.

use crate::catalog::{RenderType, TileCatalog, TileId};

pub const TOP: u8 = 1;
pub const LEFT: u8 = 2;
pub const RIGHT: u8 = 4;
pub const BOTTOM: u8 = 8;
pub const ALL: u8 = TOP | LEFT | RIGHT | BOTTOM;
/// Base of the diagonal variants.
pub const DIAGONAL: u8 = 16;

/// Computes the adjacency byte for `(x, y)` from the tiles returned by
/// `tile_at`, which must yield air for out-of-bounds coordinates.
pub fn compute_adjacency<F>(catalog: &TileCatalog, x: i32, y: i32, tile_at: F) -> u8
where
    F: Fn(i32, i32) -> TileId,
{
    let center = tile_at(x, y);
    let connects = |dx: i32, dy: i32| catalog.can_connect(center, tile_at(x + dx, y + dy));

    let top = connects(0, -1);
    let left = connects(-1, 0);
    let right = connects(1, 0);
    let bottom = connects(0, 1);

    if catalog.render_type(center) == RenderType::Land {
        // Evaluated in order; each case needs a different pair of open sides
        // so at most one can match.
        let rising = connects(-1, 1) || connects(1, -1);
        let falling = connects(-1, -1) || connects(1, 1);

        if !left && !top && rising && bottom && right {
            return DIAGONAL;
        }
        if !right && !top && falling && bottom && left {
            return DIAGONAL + 1;
        }
        if !left && !bottom && falling && top && right {
            return DIAGONAL + 2;
        }
        if !right && !bottom && rising && top && left {
            return DIAGONAL + 3;
        }
    }

    let mut mask = 0;
    if top {
        mask |= TOP;
    }
    if left {
        mask |= LEFT;
    }
    if right {
        mask |= RIGHT;
    }
    if bottom {
        mask |= BOTTOM;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TileDef;

    /// Builds a lookup over a small ASCII picture: `#` land, `s` sprite, `.` air.
    fn picture(rows: &[&str]) -> impl Fn(i32, i32) -> TileId {
        let cells: Vec<Vec<TileId>> = rows
            .iter()
            .map(|row| {
                row.chars()
                    .map(|c| match c {
                        '#' => TileId(1),
                        's' => TileId(2),
                        _ => TileId::AIR,
                    })
                    .collect()
            })
            .collect();
        move |x, y| {
            if x < 0 || y < 0 {
                return TileId::AIR;
            }
            cells
                .get(y as usize)
                .and_then(|row| row.get(x as usize))
                .copied()
                .unwrap_or(TileId::AIR)
        }
    }

    fn catalog() -> TileCatalog {
        let mut catalog = TileCatalog::new();
        catalog
            .register(TileDef::new("dirt", 0, RenderType::Land, true))
            .unwrap();
        catalog
            .register(TileDef::new("crate", 1, RenderType::Sprite, true))
            .unwrap();
        catalog
    }

    #[test]
    fn test_isolated_tile_has_empty_mask() {
        let catalog = catalog();
        let tiles = picture(&["...", ".#.", "..."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), 0);
    }

    #[test]
    fn test_surrounded_tile_has_full_mask() {
        let catalog = catalog();
        let tiles = picture(&["###", "###", "###"]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), ALL);
    }

    #[test]
    fn test_orthogonal_bits() {
        let catalog = catalog();
        let tiles = picture(&[".#.", "##.", "..."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), TOP | LEFT);
    }

    #[test]
    fn test_diagonal_top_left_slope() {
        let catalog = catalog();
        // Open left and top, solid right and bottom, far corner connects.
        let tiles = picture(&["...", ".##", "##."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), DIAGONAL);
    }

    #[test]
    fn test_diagonal_top_right_slope() {
        let catalog = catalog();
        let tiles = picture(&["...", "##.", ".##"]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), DIAGONAL + 1);
    }

    #[test]
    fn test_diagonal_bottom_left_slope() {
        let catalog = catalog();
        let tiles = picture(&["##.", ".##", "..."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), DIAGONAL + 2);
    }

    #[test]
    fn test_diagonal_bottom_right_slope() {
        let catalog = catalog();
        let tiles = picture(&[".##", "##.", "..."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), DIAGONAL + 3);
    }

    #[test]
    fn test_corner_without_diagonal_support_uses_mask() {
        let catalog = catalog();
        let tiles = picture(&["...", ".##", ".#."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), RIGHT | BOTTOM);
    }

    #[test]
    fn test_sprites_never_take_diagonals() {
        let catalog = catalog();
        let tiles = picture(&["...", ".ss", "ss."]);
        assert_eq!(compute_adjacency(&catalog, 1, 1, &tiles), RIGHT | BOTTOM);
    }

    #[test]
    fn test_out_of_bounds_reads_as_air() {
        let catalog = catalog();
        let tiles = picture(&["#"]);
        assert_eq!(compute_adjacency(&catalog, 0, 0, &tiles), 0);
        // Air connects to air, including past the edge.
        assert_eq!(compute_adjacency(&catalog, 5, 5, &tiles), ALL);
    }
}
