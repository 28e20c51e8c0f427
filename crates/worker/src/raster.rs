//! Heat-map rasterization.
//!
//! Points are projected into the global pixel grid of a zoom level (tile
//! grid times tile size). Every point adds `weight * (1 - d / radius)` to
//! each pixel whose center lies within `radius` pixels of it.

use foundation::math::{Geodetic2, MERCATOR_HALF_EXTENT};
use streaming::{HeatPoint, InitPayload, TileCoord};

/// Rendering parameters for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatParams {
    pub radius: f64,
    pub tile_size: u32,
    pub gradient: Vec<[u8; 3]>,
    /// `<= 0` scales each tile to its own hottest pixel.
    pub max_intensity: f64,
    pub zoom: u8,
}

impl From<InitPayload> for HeatParams {
    fn from(p: InitPayload) -> Self {
        Self {
            radius: p.radius,
            tile_size: p.tile_size,
            gradient: p.gradient,
            max_intensity: p.max_intensity,
            zoom: p.zoom,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct Splat {
    x: f64,
    y: f64,
    weight: f64,
}

impl HeatParams {
    fn radius_px(&self) -> f64 {
        self.radius.max(1.0)
    }

    fn world_px(&self) -> f64 {
        TileCoord::tiles_per_axis(self.zoom) as f64 * self.tile_size as f64
    }

    fn project(&self, points: &[HeatPoint]) -> Vec<Splat> {
        let world = self.world_px();
        let span = 2.0 * MERCATOR_HALF_EXTENT;
        points
            .iter()
            .map(|p| {
                let m = Geodetic2::from_degrees(p.lng, p.lat).to_mercator();
                Splat {
                    x: (m.x + MERCATOR_HALF_EXTENT) / span * world,
                    y: (MERCATOR_HALF_EXTENT - m.y) / span * world,
                    weight: p.weight,
                }
            })
            .collect()
    }

    /// Raw (unnormalized) heat of one tile, row-major.
    pub fn heat_tile(&self, points: &[HeatPoint], col: u32, row: u32) -> Vec<f64> {
        let size = self.tile_size as usize;
        let radius = self.radius_px();
        let x0 = col as f64 * self.tile_size as f64;
        let y0 = row as f64 * self.tile_size as f64;
        let x1 = x0 + self.tile_size as f64;
        let y1 = y0 + self.tile_size as f64;

        let near: Vec<Splat> = self
            .project(points)
            .into_iter()
            .filter(|s| s.x > x0 - radius && s.x < x1 + radius && s.y > y0 - radius && s.y < y1 + radius)
            .collect();

        let mut heat = vec![0.0; size * size];
        if near.is_empty() {
            return heat;
        }
        for py in 0..size {
            for px in 0..size {
                let cx = x0 + px as f64 + 0.5;
                let cy = y0 + py as f64 + 0.5;
                heat[py * size + px] = intensity(&near, cx, cy, radius);
            }
        }
        heat
    }

    /// RGBA pixels of one tile.
    pub fn render_tile(&self, points: &[HeatPoint], col: u32, row: u32) -> Vec<u8> {
        let heat = self.heat_tile(points, col, row);
        let scale = if self.max_intensity > 0.0 {
            self.max_intensity
        } else {
            heat.iter().copied().fold(0.0, f64::max)
        };

        let mut rgba = Vec::with_capacity(heat.len() * 4);
        for h in heat {
            if h <= 0.0 || scale <= 0.0 {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let t = (h / scale).min(1.0);
            let [r, g, b] = sample_gradient(&self.gradient, t);
            rgba.extend_from_slice(&[r, g, b, (t * 255.0).round() as u8]);
        }
        rgba
    }

    /// Hottest value found at the pixels holding the points.
    pub fn heater(&self, points: &[HeatPoint]) -> f64 {
        let splats = self.project(points);
        let radius = self.radius_px();
        splats
            .iter()
            .map(|s| intensity(&splats, s.x.floor() + 0.5, s.y.floor() + 0.5, radius))
            .fold(0.0, f64::max)
    }
}

fn intensity(splats: &[Splat], x: f64, y: f64, radius: f64) -> f64 {
    splats
        .iter()
        .map(|s| {
            let d = ((s.x - x).powi(2) + (s.y - y).powi(2)).sqrt();
            if d < radius {
                s.weight * (1.0 - d / radius)
            } else {
                0.0
            }
        })
        .sum()
}

/// Linear interpolation through the color stops; `t` in `[0, 1]`.
pub fn sample_gradient(stops: &[[u8; 3]], t: f64) -> [u8; 3] {
    match stops {
        [] => [0, 0, 0],
        [only] => *only,
        _ => {
            let pos = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
            let i = (pos.floor() as usize).min(stops.len() - 2);
            let f = pos - i as f64;
            let (a, b) = (stops[i], stops[i + 1]);
            let mix = |k: usize| (a[k] as f64 + (b[k] as f64 - a[k] as f64) * f).round() as u8;
            [mix(0), mix(1), mix(2)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HeatParams, sample_gradient};
    use streaming::{HeatPoint, TileCoord};

    fn params(max_intensity: f64) -> HeatParams {
        HeatParams {
            radius: 3.0,
            tile_size: 8,
            gradient: vec![[0, 0, 255], [255, 0, 0]],
            max_intensity,
            zoom: 0,
        }
    }

    #[test]
    fn gradient_endpoints_and_midpoint() {
        let stops = [[0, 0, 0], [200, 100, 50]];
        assert_eq!(sample_gradient(&stops, 0.0), [0, 0, 0]);
        assert_eq!(sample_gradient(&stops, 1.0), [200, 100, 50]);
        assert_eq!(sample_gradient(&stops, 0.5), [100, 50, 25]);
        assert_eq!(sample_gradient(&[[9, 9, 9]], 0.7), [9, 9, 9]);
    }

    #[test]
    fn unbounded_tile_peaks_at_the_point() {
        let p = params(-1.0);
        // Null Island sits at the center of the single zoom-0 tile.
        let points = [HeatPoint::new(0.0, 0.0, 2.0)];
        let rgba = p.render_tile(&points, 0, 0);
        assert_eq!(rgba.len(), 8 * 8 * 4);

        let alphas: Vec<u8> = rgba.chunks(4).map(|px| px[3]).collect();
        let peak = alphas.iter().copied().max().unwrap();
        assert_eq!(peak, 255);
        // Corners are farther than the radius.
        assert_eq!(alphas[0], 0);
        assert_eq!(alphas[63], 0);
    }

    #[test]
    fn bounded_intensity_scales_down() {
        let points = [HeatPoint::new(0.0, 0.0, 1.0)];
        let unbounded = params(-1.0).render_tile(&points, 0, 0);
        let bounded = params(100.0).render_tile(&points, 0, 0);
        let max_alpha = |rgba: &[u8]| rgba.chunks(4).map(|px| px[3]).max().unwrap_or(0);
        assert!(max_alpha(&bounded) < max_alpha(&unbounded));
        assert!(max_alpha(&bounded) <= 3);
    }

    #[test]
    fn tile_without_nearby_points_is_transparent() {
        let mut p = params(-1.0);
        p.zoom = 4;
        let points = [HeatPoint::new(39.9, 116.4, 5.0)];
        let far = TileCoord::from_geodetic(foundation::math::Geodetic2::from_degrees(-70.0, -30.0), 4);
        assert!(p.render_tile(&points, far.col, far.row).iter().all(|b| *b == 0));
    }

    #[test]
    fn heater_sums_overlapping_points() {
        let p = params(-1.0);
        let one = p.heater(&[HeatPoint::new(0.0, 0.0, 1.0)]);
        let two = p.heater(&[HeatPoint::new(0.0, 0.0, 1.0), HeatPoint::new(0.0, 0.0, 1.0)]);
        assert!(one > 0.0);
        assert!((two - 2.0 * one).abs() < 1e-12);
    }
}
