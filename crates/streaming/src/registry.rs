//! Tile registry: the set of tiles touched by a layer's points at one zoom.
//!
//! A registry is never diffed. Any change to the point set or the zoom builds
//! a fresh one, and responses for tiles that did not survive are discarded.

use std::collections::BTreeMap;

use foundation::math::Geodetic2;
use foundation::{MeshHandle, TextureHandle};
use tracing::debug;

use crate::protocol::{HeatPoint, ProtocolError, TileImage};
use crate::tile::{TileCoord, TileKey};

/// Where a tile is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileState {
    /// Created by a rebuild; no imagery yet.
    Empty,
    /// Pixels arrived but have not been uploaded.
    Decoded,
    /// Texture bound and drawable.
    Resident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub coord: TileCoord,
    pixels: Option<Vec<u8>>,
    pub mesh: Option<MeshHandle>,
    pub texture: Option<TextureHandle>,
}

impl Tile {
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            pixels: None,
            mesh: None,
            texture: None,
        }
    }

    pub fn state(&self) -> TileState {
        match (self.pixels.is_some(), self.texture.is_some()) {
            (true, _) => TileState::Decoded,
            (false, true) => TileState::Resident,
            (false, false) => TileState::Empty,
        }
    }

    /// Pixels waiting for upload, taken so the upload happens once.
    pub fn take_pixels(&mut self) -> Option<Vec<u8>> {
        self.pixels.take()
    }

    pub fn set_pixels(&mut self, pixels: Vec<u8>) {
        self.pixels = Some(pixels);
    }

    /// GPU handles owned by this tile.
    pub fn handles(&self) -> (Option<MeshHandle>, Option<TextureHandle>) {
        (self.mesh, self.texture)
    }
}

/// Result of applying a `tileCreated` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(TileKey),
    /// No live tile for the response's coordinates.
    Stale(TileKey),
}

#[derive(Debug, Clone, Default)]
pub struct TileRegistry {
    zoom: u8,
    tiles: BTreeMap<TileKey, Tile>,
}

impl TileRegistry {
    pub fn new(zoom: u8) -> Self {
        Self {
            zoom,
            tiles: BTreeMap::new(),
        }
    }

    /// Builds a registry holding one empty tile per distinct tile touched by
    /// `points` at `zoom`.
    pub fn build(points: &[HeatPoint], zoom: u8) -> Self {
        let mut tiles = BTreeMap::new();
        for p in points {
            let coord = TileCoord::from_geodetic(Geodetic2::from_degrees(p.lng, p.lat), zoom);
            tiles.entry(coord.key()).or_insert_with(|| Tile::new(coord));
        }
        Self { zoom, tiles }
    }

    /// Replaces the contents with a fresh build and returns the tiles that
    /// were dropped, so their GPU handles can be released.
    pub fn rebuild(&mut self, points: &[HeatPoint], zoom: u8) -> Vec<Tile> {
        let next = Self::build(points, zoom);
        let old = std::mem::replace(self, next);
        debug!(
            zoom,
            points = points.len(),
            tiles = self.tiles.len(),
            evicted = old.tiles.len(),
            "tile registry rebuilt"
        );
        old.tiles.into_values().collect()
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.tiles.contains_key(&key)
    }

    pub fn get(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(&key)
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.tiles.values().map(|t| t.coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &Tile)> {
        self.tiles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TileKey, &mut Tile)> {
        self.tiles.iter_mut()
    }

    /// Attaches decoded imagery to the live tile named by `image`.
    ///
    /// A response for a tile that is not in this registry is stale and leaves
    /// every tile untouched.
    pub fn apply_image(&mut self, image: &TileImage) -> Result<ApplyOutcome, ProtocolError> {
        let key = image.coord().key();
        let Some(tile) = self.tiles.get_mut(&key) else {
            return Ok(ApplyOutcome::Stale(key));
        };
        tile.set_pixels(image.decode_pixels()?);
        Ok(ApplyOutcome::Applied(key))
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplyOutcome, TileRegistry, TileState};
    use crate::protocol::{HeatPoint, TileImage};
    use crate::tile::TileCoord;
    use foundation::TextureHandle;
    use pretty_assertions::assert_eq;

    fn beijing() -> Vec<HeatPoint> {
        vec![
            HeatPoint::new(39.904, 116.404, 1.0),
            HeatPoint::new(39.906, 116.406, 3.0),
        ]
    }

    #[test]
    fn points_in_the_same_tile_share_one_entry() {
        let registry = TileRegistry::build(&beijing(), 10);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.coords().collect::<Vec<_>>(),
            vec![TileCoord::new(10, 388, 843)]
        );
    }

    #[test]
    fn distinct_tiles_each_get_an_entry() {
        let mut points = beijing();
        points.push(HeatPoint::new(-33.87, 151.21, 1.0));
        let registry = TileRegistry::build(&points, 10);
        assert_eq!(registry.len(), 2);
        assert!(registry.iter().all(|(_, t)| t.state() == TileState::Empty));
    }

    #[test]
    fn rebuild_replaces_and_returns_evicted_tiles() {
        let mut registry = TileRegistry::build(&beijing(), 10);
        let evicted = registry.rebuild(&beijing(), 11);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].coord.zoom, 10);
        assert_eq!(registry.zoom(), 11);
        assert!(registry.coords().all(|c| c.zoom == 11));
    }

    #[test]
    fn matching_response_attaches_pixels() {
        let mut registry = TileRegistry::build(&beijing(), 10);
        let coord = TileCoord::new(10, 388, 843);
        let image = TileImage::encode(coord, &[1, 2, 3, 4]);

        assert_eq!(registry.apply_image(&image), Ok(ApplyOutcome::Applied(coord.key())));
        let tile = registry.get(coord.key()).unwrap();
        assert_eq!(tile.state(), TileState::Decoded);
    }

    #[test]
    fn stale_response_is_inert() {
        let mut registry = TileRegistry::build(&beijing(), 10);
        let old = TileCoord::new(10, 388, 843);
        registry.rebuild(&beijing(), 12);
        let before: Vec<_> = registry.iter().map(|(k, t)| (*k, t.clone())).collect();

        let outcome = registry.apply_image(&TileImage::encode(old, &[9; 16]));
        assert_eq!(outcome, Ok(ApplyOutcome::Stale(old.key())));
        let after: Vec<_> = registry.iter().map(|(k, t)| (*k, t.clone())).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn state_tracks_upload() {
        let mut registry = TileRegistry::build(&beijing(), 10);
        let (_, tile) = registry.iter_mut().next().unwrap();
        tile.set_pixels(vec![0; 4]);
        assert_eq!(tile.state(), TileState::Decoded);
        assert!(tile.take_pixels().is_some());
        tile.texture = Some(TextureHandle(1));
        assert_eq!(tile.state(), TileState::Resident);
    }
}
