use foundation::math::Vec3;

/// Unit quaternion `[x, y, z, w]`.
pub type Quat = [f64; 4];

pub const QUAT_IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

/// World-space placement of an entity (render space, y up).
///
/// The orbit/input controller owns the values; everything here only reads
/// them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: QUAT_IDENTITY,
        }
    }

    pub fn translate(position: Vec3) -> Self {
        Self {
            position,
            rotation: QUAT_IDENTITY,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotate a vector by this transform's rotation.
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let q = self.rotation;
        let qv = Vec3::new(q[0], q[1], q[2]);
        let t = cross(qv, v).scale(2.0);
        v + t.scale(q[3]) + cross(qv, t)
    }
}

/// Rotation taking the render-space `-z` axis (camera forward) onto `forward`,
/// keeping `+y` as up where possible.
pub fn look_rotation(forward: Vec3) -> Quat {
    let f = forward.normalize();
    let up = if f.y.abs() > 0.999 {
        Vec3::new(0.0, 0.0, -1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };
    let s = cross(f, up).normalize();
    let u = cross(s, f);
    // Columns of the rotation matrix: s, u, -f.
    quat_from_basis(s, u, -f)
}

pub(crate) fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

fn quat_from_basis(x: Vec3, y: Vec3, z: Vec3) -> Quat {
    let (m00, m11, m22) = (x.x, y.y, z.z);
    let trace = m00 + m11 + m22;
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [(y.z - z.y) / s, (z.x - x.z) / s, (x.y - y.x) / s, 0.25 * s]
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        [0.25 * s, (y.x + x.y) / s, (z.x + x.z) / s, (y.z - z.y) / s]
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        [(y.x + x.y) / s, 0.25 * s, (z.y + y.z) / s, (z.x - x.z) / s]
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        [(z.x + x.z) / s, (z.y + y.z) / s, 0.25 * s, (x.y - y.x) / s]
    }
}

#[cfg(test)]
mod tests {
    use super::{Transform, look_rotation};
    use foundation::math::Vec3;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-9, "expected {a:?} ~= {b:?}");
    }

    #[test]
    fn identity_is_origin() {
        let transform = Transform::identity();
        assert_eq!(transform.position, Vec3::ZERO);
        assert_eq!(transform.rotate(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn look_rotation_points_forward_axis() {
        let forward = Vec3::new(-1.0, 0.0, 0.0);
        let t = Transform::identity().with_rotation(look_rotation(forward));
        assert_vec_close(t.rotate(Vec3::new(0.0, 0.0, -1.0)), forward);
        assert_vec_close(t.rotate(Vec3::new(0.0, 1.0, 0.0)), Vec3::new(0.0, 1.0, 0.0));
    }
}
