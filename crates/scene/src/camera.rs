use foundation::math::{Ellipsoid, Vec3, right_to_geographic};

use crate::components::Transform;
use crate::lod::{HeightProbe, LodResolver};

/// Column-major 4x4 matrix.
pub type Mat4 = [[f64; 4]; 4];

/// Drawing surface dimensions in pixels, as exposed by the windowing layer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Per-frame camera data uploaded alongside every draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub position_squared: [f32; 3],
    pub far: f32,
}

/// Perspective camera orbiting an ellipsoidal planet.
///
/// The camera lives in render space (y up). Geometry and LOD work happens in
/// the geographic frame (z up); the model matrix returned by
/// [`geographic_model_matrix`] bridges the two.
#[derive(Debug, Clone)]
pub struct Camera<P = Ellipsoid> {
    pub transform: Transform,
    pub fov_y_deg: f64,
    pub near: f64,
    pub far: f64,
    ellipsoid: Ellipsoid,
    lod: LodResolver<P>,
}

impl Camera<Ellipsoid> {
    pub fn wgs84() -> Self {
        let ellipsoid = Ellipsoid::wgs84();
        Self::with_probe(ellipsoid, ellipsoid)
    }
}

impl<P: HeightProbe> Camera<P> {
    pub fn with_probe(ellipsoid: Ellipsoid, probe: P) -> Self {
        Self {
            transform: Transform::identity(),
            fov_y_deg: 45.0,
            near: 0.1,
            far: 100.0,
            ellipsoid,
            lod: LodResolver::new(probe),
        }
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Current zoom level; recomputed only when the camera has moved.
    pub fn level(&mut self) -> u8 {
        self.lod.level(self.transform.position)
    }

    /// World-to-view matrix (inverse of the camera's rigid transform).
    pub fn view_matrix(&self) -> Mat4 {
        let t = &self.transform;
        let x = t.rotate(Vec3::new(1.0, 0.0, 0.0));
        let y = t.rotate(Vec3::new(0.0, 1.0, 0.0));
        let z = t.rotate(Vec3::new(0.0, 0.0, 1.0));
        let p = t.position;
        [
            [x.x, y.x, z.x, 0.0],
            [x.y, y.y, z.y, 0.0],
            [x.z, y.z, z.z, 0.0],
            [-x.dot(p), -y.dot(p), -z.dot(p), 1.0],
        ]
    }

    pub fn projection_matrix(&self, surface: SurfaceSize) -> Mat4 {
        perspective(
            self.fov_y_deg.to_radians(),
            surface.aspect(),
            self.near,
            self.far,
        )
    }

    /// Projection * view * geographic model matrix.
    pub fn mvp_matrix(&self, surface: SurfaceSize) -> Mat4 {
        let vp = mat4_mul(self.projection_matrix(surface), self.view_matrix());
        mat4_mul(vp, geographic_model_matrix())
    }

    pub fn uniforms(&self, surface: SurfaceSize) -> CameraUniforms {
        let vp = mat4_mul(self.projection_matrix(surface), self.view_matrix());
        let position = self.transform.position;
        CameraUniforms {
            view_proj: to_f32(vp),
            position: position.as_f32_array(),
            position_squared: position.mul(position).as_f32_array(),
            far: self.far as f32,
        }
    }

    /// Geographic Cartesian point to normalized device coordinates.
    pub fn geographic_to_ndc(&self, point: Vec3, surface: SurfaceSize) -> Vec3 {
        let m = self.mvp_matrix(surface);
        let v = [point.x, point.y, point.z, 1.0];
        let mut out = [0.0; 4];
        for (row, slot) in out.iter_mut().enumerate() {
            *slot = (0..4).map(|col| m[col][row] * v[col]).sum();
        }
        let w = out[3];
        Vec3::new(out[0] / w, out[1] / w, out[2] / w)
    }

    /// Whether a geographic point on the front face of the ellipsoid lands
    /// inside the viewport.
    ///
    /// The point is front-facing when the ray from the camera toward it first
    /// meets the surface no nearer than the point itself (within 5 m).
    pub fn is_world_visible(&self, world: Vec3, ndc: Vec3) -> bool {
        let camera = right_to_geographic(self.transform.position);
        let direction = (world - camera).normalize();
        let hit = self.ellipsoid.intersect_ray(camera, direction);
        if !hit.intersects {
            return false;
        }

        let pick = camera + direction.scale(hit.near);
        let to_world = (camera - world).length();
        let to_pick = (camera - pick).length();
        if to_world >= to_pick + 5.0 {
            return false;
        }
        (-1.0..=1.0).contains(&ndc.x) && (-1.0..=1.0).contains(&ndc.y)
    }
}

/// Maps geographic Cartesian (z up) into render space (y up).
pub fn geographic_model_matrix() -> Mat4 {
    [
        [0.0, 0.0, 1.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Right-handed perspective with depth in `[-1, 1]`.
pub fn perspective(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
    let f = 1.0 / (0.5 * fov_y_rad).tan();
    let nf = 1.0 / (near - far);
    [
        [f / aspect, 0.0, 0.0, 0.0],
        [0.0, f, 0.0, 0.0],
        [0.0, 0.0, (far + near) * nf, -1.0],
        [0.0, 0.0, 2.0 * far * near * nf, 0.0],
    ]
}

pub fn mat4_mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut c = [[0.0; 4]; 4];
    for col in 0..4 {
        for row in 0..4 {
            c[col][row] = a[0][row] * b[col][0]
                + a[1][row] * b[col][1]
                + a[2][row] * b[col][2]
                + a[3][row] * b[col][3];
        }
    }
    c
}

fn to_f32(m: Mat4) -> [[f32; 4]; 4] {
    m.map(|col| col.map(|v| v as f32))
}
