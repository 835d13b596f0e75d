use crate::particle::EulerAngles;

/// Row-major 3×3 matrix.
pub type Rotation = [[f64; 3]; 3];

pub const IDENTITY: Rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Rotation matrix for ZYZ Euler angles (rot, tilt, psi) in radians.
///
/// The matrix maps volume coordinates into the particle's image frame
/// (RELION convention); its transpose takes image coordinates back into the
/// volume.
pub fn euler_to_rotation(rot: f64, tilt: f64, psi: f64) -> Rotation {
    let (sr, cr) = rot.sin_cos();
    let (st, ct) = tilt.sin_cos();
    let (sp, cp) = psi.sin_cos();
    [
        [
            cp * ct * cr - sp * sr,
            cp * ct * sr + sp * cr,
            -cp * st,
        ],
        [
            -sp * ct * cr - cp * sr,
            -sp * ct * sr + cp * cr,
            sp * st,
        ],
        [st * cr, st * sr, ct],
    ]
}

impl EulerAngles {
    /// Rotation matrix for these angles (stored in degrees).
    pub fn rotation(&self) -> Rotation {
        euler_to_rotation(
            self.rot.to_radians(),
            self.tilt.to_radians(),
            self.psi.to_radians(),
        )
    }
}

pub fn transpose(m: &Rotation) -> Rotation {
    let mut t = [[0.0; 3]; 3];
    for (i, row) in m.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

pub fn apply(m: &Rotation, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}
