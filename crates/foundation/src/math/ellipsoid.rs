//! Biaxial reference ellipsoid and closed-form ray intersection.

use super::{Geodetic2, Vec3, WGS84_A, WGS84_B};

/// Result of a ray/ellipsoid test.
///
/// `near` and `far` are distances along the (normalized) ray direction and are
/// only meaningful when `intersects` is true. When the origin lies inside the
/// ellipsoid, `near` is negative and `far` is positive.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Intersection {
    pub intersects: bool,
    pub near: f64,
    pub far: f64,
}

impl Intersection {
    pub const MISS: Intersection = Intersection {
        intersects: false,
        near: 0.0,
        far: 0.0,
    };
}

/// Intersect a ray with an axis-aligned ellipsoid centered at the origin.
///
/// Substitutes `origin + t * direction` into `sum(p_i^2 / r_i^2) = 1` using
/// precomputed reciprocal squared radii. A ray whose surface crossings lie
/// entirely behind the origin is a miss.
pub fn ray_intersect_ellipsoid(
    origin: Vec3,
    origin_squared: Vec3,
    direction: Vec3,
    one_over_radii_squared: Vec3,
) -> Intersection {
    let a = direction.mul(direction).dot(one_over_radii_squared);
    let b = 2.0 * origin.mul(direction).dot(one_over_radii_squared);
    let c = origin_squared.dot(one_over_radii_squared) - 1.0;

    let discriminant = b * b - 4.0 * a * c;
    if !(a > 0.0) || !(discriminant >= 0.0) {
        // Also rejects NaN coefficients from a degenerate direction.
        return Intersection::MISS;
    }

    let root = discriminant.sqrt();
    let t0 = (-b - root) / (2.0 * a);
    let t1 = (-b + root) / (2.0 * a);
    let near = t0.min(t1);
    let far = t0.max(t1);

    if far < 0.0 {
        return Intersection::MISS;
    }

    Intersection {
        intersects: true,
        near,
        far,
    }
}

/// Immutable reference surface, shared by value across geometry calls.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipsoid {
    radii: Vec3,
    one_over_radii_squared: Vec3,
}

impl Ellipsoid {
    pub fn new(radii: Vec3) -> Self {
        Self {
            radii,
            one_over_radii_squared: Vec3::new(
                1.0 / (radii.x * radii.x),
                1.0 / (radii.y * radii.y),
                1.0 / (radii.z * radii.z),
            ),
        }
    }

    pub fn wgs84() -> Self {
        Self::new(Vec3::new(WGS84_A, WGS84_A, WGS84_B))
    }

    pub fn unit_sphere() -> Self {
        Self::new(Vec3::new(1.0, 1.0, 1.0))
    }

    pub fn radii(&self) -> Vec3 {
        self.radii
    }

    pub fn one_over_radii_squared(&self) -> Vec3 {
        self.one_over_radii_squared
    }

    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Intersection {
        ray_intersect_ellipsoid(
            origin,
            origin.mul(origin),
            direction,
            self.one_over_radii_squared,
        )
    }

    /// Outward normal of the ellipsoid surface through the given point.
    pub fn geodetic_surface_normal(&self, p: Vec3) -> Vec3 {
        p.mul(self.one_over_radii_squared).normalize()
    }

    /// Geographic Cartesian (z polar) to longitude/latitude.
    ///
    /// Latitude comes from the geodetic surface normal, which is exact for
    /// points on the surface. No special handling at the poles beyond `atan2`.
    pub fn to_geodetic2(&self, p: Vec3) -> Geodetic2 {
        let n = self.geodetic_surface_normal(p);
        Geodetic2::new(p.y.atan2(p.x), n.z.clamp(-1.0, 1.0).asin())
    }

    /// Point on the surface at the given longitude/latitude.
    pub fn to_cartesian(&self, g: Geodetic2) -> Vec3 {
        let cos_lat = g.lat_rad.cos();
        let n = Vec3::new(
            cos_lat * g.lon_rad.cos(),
            cos_lat * g.lon_rad.sin(),
            g.lat_rad.sin(),
        );
        let k = self.radii.mul(self.radii).mul(n);
        let gamma = k.dot(n).sqrt();
        k.scale(1.0 / gamma)
    }
}
