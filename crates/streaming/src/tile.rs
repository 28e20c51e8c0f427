//! Power-of-two Web Mercator tile grid.
//!
//! Row 0 is the northernmost row and column 0 starts at the antimeridian, so
//! `(zoom, row, col)` matches the usual XYZ scheme with `x = col`, `y = row`.

use foundation::math::{Geodetic2, MERCATOR_HALF_EXTENT, Vec2};
use serde::{Deserialize, Serialize};

/// Highest zoom whose row/col fit the packed [`TileKey`] layout.
pub const MAX_ZOOM: u8 = 28;

const ROW_COL_BITS: u32 = 28;
const ROW_COL_MASK: u64 = (1 << ROW_COL_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub row: u32,
    pub col: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, row: u32, col: u32) -> Self {
        Self { zoom, row, col }
    }

    /// Tiles along one axis at `zoom`; `zoom` must not exceed [`MAX_ZOOM`].
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom
    }

    pub fn from_mercator(m: Vec2, zoom: u8) -> Self {
        let (row, col) = tile_row_col(m.x, m.y, zoom);
        Self::new(zoom, row, col)
    }

    pub fn from_geodetic(g: Geodetic2, zoom: u8) -> Self {
        Self::from_mercator(g.to_mercator(), zoom)
    }

    pub fn key(&self) -> TileKey {
        generate_key(self.zoom, self.row, self.col)
    }

    /// Whether `row` and `col` lie inside the grid of a supported zoom.
    pub fn is_valid(&self) -> bool {
        self.zoom <= MAX_ZOOM
            && self.row < Self::tiles_per_axis(self.zoom)
            && self.col < Self::tiles_per_axis(self.zoom)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.row, self.col)
    }
}

/// Side length of a tile at `zoom`, in Mercator meters.
pub fn tile_size_m(zoom: u8) -> f64 {
    2.0 * MERCATOR_HALF_EXTENT / TileCoord::tiles_per_axis(zoom) as f64
}

/// Row and column of the tile containing a Mercator position.
///
/// Positions on or beyond the world edge land in the outermost tile.
pub fn tile_row_col(mercator_x: f64, mercator_y: f64, zoom: u8) -> (u32, u32) {
    let size = tile_size_m(zoom);
    let last = (TileCoord::tiles_per_axis(zoom) - 1) as f64;
    let col = ((mercator_x + MERCATOR_HALF_EXTENT) / size).floor().clamp(0.0, last);
    let row = ((MERCATOR_HALF_EXTENT - mercator_y) / size).floor().clamp(0.0, last);
    (row as u32, col as u32)
}

/// Registry key for a tile: `zoom` in the top byte, then 28 bits each of row
/// and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey(pub u64);

impl TileKey {
    fn coord(self) -> TileCoord {
        TileCoord::new(
            (self.0 >> (2 * ROW_COL_BITS)) as u8,
            ((self.0 >> ROW_COL_BITS) & ROW_COL_MASK) as u32,
            (self.0 & ROW_COL_MASK) as u32,
        )
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.coord().fmt(f)
    }
}

/// Packs `(zoom, row, col)` into a collision-free key.
///
/// Injective for `zoom <= MAX_ZOOM` with row and col inside the grid; keeping
/// inputs in range is the caller's job.
pub fn generate_key(zoom: u8, row: u32, col: u32) -> TileKey {
    debug_assert!(zoom <= MAX_ZOOM, "zoom {zoom} out of range");
    TileKey(
        ((zoom as u64) << (2 * ROW_COL_BITS))
            | (((row as u64) & ROW_COL_MASK) << ROW_COL_BITS)
            | ((col as u64) & ROW_COL_MASK),
    )
}
