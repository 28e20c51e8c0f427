//! Camera level-of-detail from height above the reference ellipsoid.

use foundation::math::{Ellipsoid, Vec3, right_to_geographic};
use tracing::debug;

/// Level reported before the camera has ever moved.
pub const DEFAULT_LEVEL: u8 = 2;

/// Coarsest level; used for every height above the last band.
pub const MIN_LEVEL: u8 = 2;

/// Finest level.
pub const MAX_LEVEL: u8 = 19;

/// Height bands in ascending order: `(inclusive upper bound in meters, level)`.
///
/// An approximation of what the viewer can resolve; exact frustum coverage is
/// out of scope. The bound values are part of the observable behavior.
pub const LEVEL_BANDS: [(f64, u8); 17] = [
    (100.0, 19),
    (300.0, 18),
    (660.0, 17),
    (1_300.0, 16),
    (2_600.0, 15),
    (6_400.0, 14),
    (13_200.0, 13),
    (26_000.0, 12),
    (67_985.0, 11),
    (139_780.0, 10),
    (250_600.0, 9),
    (380_000.0, 8),
    (640_000.0, 7),
    (1_280_000.0, 6),
    (2_600_000.0, 5),
    (6_100_000.0, 4),
    (11_900_000.0, 3),
];

/// Map a height above the surface to a zoom level.
pub fn level_for_height(h: f64) -> u8 {
    LEVEL_BANDS
        .iter()
        .find(|(upper, _)| h <= *upper)
        .map(|(_, level)| *level)
        .unwrap_or(MIN_LEVEL)
}

/// Measures how far a geographic position is above the reference surface.
pub trait HeightProbe {
    fn height_above_surface(&self, position: Vec3) -> f64;
}

impl HeightProbe for Ellipsoid {
    /// Casts a ray from `position` toward the ellipsoid center and returns the
    /// near crossing distance.
    ///
    /// A position inside the surface (negative near) or at the exact center
    /// (no defined direction) is clamped to height 0.
    fn height_above_surface(&self, position: Vec3) -> f64 {
        let direction = (Vec3::ZERO - position).normalize();
        let hit = self.intersect_ray(position, direction);
        if !hit.intersects {
            return 0.0;
        }
        hit.near.max(0.0)
    }
}

impl<P: HeightProbe + ?Sized> HeightProbe for &P {
    fn height_above_surface(&self, position: Vec3) -> f64 {
        (**self).height_above_surface(position)
    }
}

/// Memoized zoom level for a camera.
///
/// The level is recomputed only when the queried position differs from the
/// last one. Comparison is exact: any bit change in any component counts as a
/// move.
#[derive(Debug, Clone)]
pub struct LodResolver<P = Ellipsoid> {
    probe: P,
    cached_level: u8,
    last_position: Vec3,
}

impl LodResolver<Ellipsoid> {
    pub fn wgs84() -> Self {
        Self::new(Ellipsoid::wgs84())
    }
}

impl<P: HeightProbe> LodResolver<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            cached_level: DEFAULT_LEVEL,
            last_position: Vec3::ZERO,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn cached_level(&self) -> u8 {
        self.cached_level
    }

    /// Zoom level for a render-space (y up) camera position.
    pub fn level(&mut self, world_position: Vec3) -> u8 {
        let position = right_to_geographic(world_position);
        if position == self.last_position {
            return self.cached_level;
        }
        self.last_position = position;

        let h = self.probe.height_above_surface(position);
        self.cached_level = level_for_height(h);
        debug!(
            x = position.x,
            y = position.y,
            z = position.z,
            height_m = h,
            level = self.cached_level,
            "camera level recomputed"
        );
        self.cached_level
    }
}
