use framesync_3d::linalg::{matmul33, matvec33, transform_points, transform_points_affine};
use serde::{Deserialize, Serialize};

/// Rotation and translation, mapping `p` to `R * p + t`.
///
/// The rotation is orthonormal in intent only: the rigid solver may return an improper rotation
/// for some inputs unless reflection correction is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation matrix, row major.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl RigidTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0, 0.0, 0.0],
        }
    }

    /// Apply the transform to a set of points.
    pub fn apply(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut dst = vec![[0.0; 3]; points.len()];
        transform_points(points, &self.rotation, &self.translation, &mut dst);
        dst
    }

    /// Compose two transforms: apply `self` first, then `other`.
    ///
    /// R_new = other.R * self.R, t_new = other.R * self.t + other.t
    pub fn then(&self, other: &RigidTransform) -> RigidTransform {
        let rotation = matmul33(&other.rotation, &self.rotation);
        let rt = matvec33(&other.rotation, &self.translation);
        RigidTransform {
            rotation,
            translation: [
                rt[0] + other.translation[0],
                rt[1] + other.translation[1],
                rt[2] + other.translation[2],
            ],
        }
    }

    /// The same mapping as a 3x4 affine matrix.
    pub fn to_affine(&self) -> AffineTransform {
        let r = &self.rotation;
        let t = &self.translation;
        AffineTransform {
            matrix: [
                [r[0][0], r[0][1], r[0][2], t[0]],
                [r[1][0], r[1][1], r[1][2], t[1]],
                [r[2][0], r[2][1], r[2][2], t[2]],
            ],
        }
    }

    fn is_finite(&self) -> bool {
        self.rotation.iter().flatten().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

/// General affine map `[A | t]`, mapping `p` to `A * p + t`. May include scale and shear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// The 3x4 matrix, row major. The last column is the translation.
    pub matrix: [[f64; 4]; 3],
}

impl AffineTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    /// Apply the transform to a set of points.
    pub fn apply(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut dst = vec![[0.0; 3]; points.len()];
        transform_points_affine(points, &self.matrix, &mut dst);
        dst
    }

    /// Compose two transforms: apply `self` first, then `other`.
    pub fn then(&self, other: &AffineTransform) -> AffineTransform {
        let a = &other.matrix;
        let b = &self.matrix;
        let mut matrix = [[0.0; 4]; 3];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
            // homogeneous row of `self` is [0, 0, 0, 1]
            row[3] += a[i][3];
        }
        AffineTransform { matrix }
    }

    fn is_finite(&self) -> bool {
        self.matrix.iter().flatten().all(|v| v.is_finite())
    }
}

/// A transform estimated by one registration step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// Rotation and translation.
    Rigid(RigidTransform),
    /// General affine map.
    Affine(AffineTransform),
}

impl Transform {
    /// Apply the transform to a set of points.
    pub fn apply(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        match self {
            Transform::Rigid(t) => t.apply(points),
            Transform::Affine(t) => t.apply(points),
        }
    }

    /// Compose two transforms: apply `self` first, then `other`.
    ///
    /// Two rigid transforms compose to a rigid one, any other combination to an affine one.
    pub fn then(&self, other: &Transform) -> Transform {
        match (self, other) {
            (Transform::Rigid(a), Transform::Rigid(b)) => Transform::Rigid(a.then(b)),
            (a, b) => Transform::Affine(a.to_affine().then(&b.to_affine())),
        }
    }

    /// The same mapping as a 3x4 affine matrix.
    pub fn to_affine(&self) -> AffineTransform {
        match self {
            Transform::Rigid(t) => t.to_affine(),
            Transform::Affine(t) => *t,
        }
    }

    /// Check that every entry is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Transform::Rigid(t) => t.is_finite(),
            Transform::Affine(t) => t.is_finite(),
        }
    }
}
