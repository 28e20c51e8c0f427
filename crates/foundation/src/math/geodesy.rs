use super::Vec3;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    pub fn from_degrees(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self::new(lat_deg.to_radians(), lon_deg.to_radians(), alt_m)
    }
}

/// Surface position (longitude, latitude) in radians.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Geodetic2 {
    pub lon_rad: f64,
    pub lat_rad: f64,
}

impl Geodetic2 {
    pub fn new(lon_rad: f64, lat_rad: f64) -> Self {
        Self { lon_rad, lat_rad }
    }

    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self::new(lon_deg.to_radians(), lat_deg.to_radians())
    }

    pub fn lon_deg(self) -> f64 {
        self.lon_rad.to_degrees()
    }

    pub fn lat_deg(self) -> f64 {
        self.lat_rad.to_degrees()
    }
}

/// Geodetic to geographic Cartesian (z is the polar axis).
pub fn geodetic_to_ecef(geo: Geodetic) -> Vec3 {
    let sin_lat = geo.lat_rad.sin();
    let cos_lat = geo.lat_rad.cos();
    let sin_lon = geo.lon_rad.sin();
    let cos_lon = geo.lon_rad.cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let x = (n + geo.alt_m) * cos_lat * cos_lon;
    let y = (n + geo.alt_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - WGS84_E2) + geo.alt_m) * sin_lat;

    Vec3::new(x, y, z)
}

/// Render-space (right-handed, y up) to geographic Cartesian (z up).
///
/// The renderer keeps the polar axis on `y`; the geographic frame keeps it on
/// `z`, with the prime meridian on `x`.
pub fn right_to_geographic(v: Vec3) -> Vec3 {
    Vec3::new(v.z, v.x, v.y)
}

/// Inverse of [`right_to_geographic`].
pub fn geographic_to_right(v: Vec3) -> Vec3 {
    Vec3::new(v.y, v.z, v.x)
}
