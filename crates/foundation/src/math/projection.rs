use std::f64::consts::{FRAC_PI_4, PI};

use super::{Geodetic2, Vec2, WGS84_A};

/// Half the side of the square Web Mercator world, in meters.
pub const MERCATOR_HALF_EXTENT: f64 = PI * WGS84_A;

/// Latitude at which the Web Mercator world becomes square.
pub const MERCATOR_MAX_LAT_DEG: f64 = 85.051_128_779_806_59;

/// Spherical (Web) Mercator projection onto the WGS84 semi-major axis.
///
/// Latitudes beyond [`MERCATOR_MAX_LAT_DEG`] are clamped so the result always
/// lies inside `[-MERCATOR_HALF_EXTENT, MERCATOR_HALF_EXTENT]`.
pub fn geodetic2_to_mercator(g: Geodetic2) -> Vec2 {
    let max_lat = MERCATOR_MAX_LAT_DEG.to_radians();
    let lat = g.lat_rad.clamp(-max_lat, max_lat);
    let x = WGS84_A * g.lon_rad;
    let y = WGS84_A * (FRAC_PI_4 + lat / 2.0).tan().ln();
    Vec2::new(x, y)
}

impl Geodetic2 {
    pub fn to_mercator(self) -> Vec2 {
        geodetic2_to_mercator(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{MERCATOR_HALF_EXTENT, geodetic2_to_mercator};
    use crate::math::Geodetic2;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn origin_projects_to_origin() {
        let m = geodetic2_to_mercator(Geodetic2::new(0.0, 0.0));
        assert_close(m.x, 0.0, 1e-9);
        assert_close(m.y, 0.0, 1e-9);
    }

    #[test]
    fn world_is_square_at_max_latitude() {
        let corner = geodetic2_to_mercator(Geodetic2::from_degrees(180.0, 89.9));
        assert_close(corner.x, MERCATOR_HALF_EXTENT, 1e-6);
        assert_close(corner.y, MERCATOR_HALF_EXTENT, 1e-3);
    }

    #[test]
    fn southern_latitudes_clamp_symmetrically() {
        let north = Geodetic2::from_degrees(10.0, 89.0).to_mercator();
        let south = Geodetic2::from_degrees(10.0, -89.0).to_mercator();
        assert_close(south.y, -north.y, 1e-6);
        assert_close(north.y, MERCATOR_HALF_EXTENT, 1e-3);
    }
}
