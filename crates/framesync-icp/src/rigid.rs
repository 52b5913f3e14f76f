use framesync_3d::linalg::{determinant33, matmul33, matvec33};
use serde::{Deserialize, Serialize};

use crate::{error::IcpError, transform::RigidTransform};

/// Minimum number of correspondences for the rigid solver.
pub const RIGID_MIN_CORRESPONDENCES: usize = 3;

/// Closed-form least-squares rotation and translation estimator.
///
/// The estimate follows Arun, Huang and Blostein, "Least-squares fitting of two 3-D point sets",
/// IEEE PAMI 1987:
///
/// 1. Compute the centroids of both point sets
/// 2. Center both point sets by subtracting their centroids
/// 3. Compute the cross-covariance H = Σ[(p_src - src_mean) * (p_dst - dst_mean)^T]
/// 4. Decompose H = U * S * V^T
/// 5. R = V * U^T
/// 6. t = dst_mean - R * src_mean
///
/// No determinant correction is applied by default, so `R` can be a reflection when the
/// correspondences are close to planar or badly matched. Set `proper_rotation` to negate the
/// singular vector of the smallest singular value in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidSolver {
    /// Force det(R) = +1.
    pub proper_rotation: bool,
}

impl RigidSolver {
    /// Estimate the transform mapping `points_src` onto `points_dst`.
    ///
    /// # Arguments
    ///
    /// * `points_src` - Old positions.
    /// * `points_dst` - Targets, one per source point.
    ///
    /// # Errors
    ///
    /// [`IcpError::DegenerateInput`] with fewer than three correspondences. Rank deficiency of
    /// the cross-covariance is not checked; whatever the decomposition yields is returned.
    pub fn estimate(
        &self,
        points_src: &[[f64; 3]],
        points_dst: &[[f64; 3]],
    ) -> Result<RigidTransform, IcpError> {
        if points_src.len() != points_dst.len() {
            return Err(IcpError::InvalidInput(format!(
                "mismatched correspondences: source ({}) != target ({})",
                points_src.len(),
                points_dst.len()
            )));
        }

        if points_src.len() < RIGID_MIN_CORRESPONDENCES {
            return Err(IcpError::DegenerateInput {
                required: RIGID_MIN_CORRESPONDENCES,
                actual: points_src.len(),
            });
        }

        // Identity transformation is a special case
        if points_src == points_dst {
            return Ok(RigidTransform::identity());
        }

        let (src_centroid, dst_centroid) = compute_centroids(points_src, points_dst);

        // H = Σ[(src - src_mean) * (dst - dst_mean)^T]
        let mut h = [[0.0; 3]; 3];
        for (p_src, p_dst) in points_src.iter().zip(points_dst.iter()) {
            let src_centered = [
                p_src[0] - src_centroid[0],
                p_src[1] - src_centroid[1],
                p_src[2] - src_centroid[2],
            ];
            let dst_centered = [
                p_dst[0] - dst_centroid[0],
                p_dst[1] - dst_centroid[1],
                p_dst[2] - dst_centroid[2],
            ];
            for (row, s) in h.iter_mut().zip(src_centered.iter()) {
                for (val, d) in row.iter_mut().zip(dst_centered.iter()) {
                    *val += s * d;
                }
            }
        }

        let h_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| h[i][j]);
        let svd = h_mat.svd();
        let u = mat33_from_faer(svd.u());
        let mut v = mat33_from_faer(svd.v());

        let mut rotation = matmul33(&v, &transpose33(&u));

        if self.proper_rotation && determinant33(&rotation) < 0.0 {
            // singular values are sorted, the last column belongs to the smallest one
            for row in v.iter_mut() {
                row[2] = -row[2];
            }
            rotation = matmul33(&v, &transpose33(&u));
        }

        let r_src = matvec33(&rotation, &src_centroid);
        let translation = [
            dst_centroid[0] - r_src[0],
            dst_centroid[1] - r_src[1],
            dst_centroid[2] - r_src[2],
        ];

        Ok(RigidTransform {
            rotation,
            translation,
        })
    }
}

/// Compute the centroids of two sets of points.
///
/// # Arguments
///
/// * `points1` - A set of points.
/// * `points2` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub fn compute_centroids(points1: &[[f64; 3]], points2: &[[f64; 3]]) -> ([f64; 3], [f64; 3]) {
    let mut centroid1 = [0.0; 3];
    let mut centroid2 = [0.0; 3];

    for (p1, p2) in points1.iter().zip(points2.iter()) {
        for k in 0..3 {
            centroid1[k] += p1[k];
            centroid2[k] += p2[k];
        }
    }

    let n = points1.len() as f64;
    for k in 0..3 {
        centroid1[k] /= n;
        centroid2[k] /= n;
    }

    (centroid1, centroid2)
}

fn mat33_from_faer(m: faer::MatRef<'_, f64>) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m.read(i, j);
        }
    }
    out
}

fn transpose33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}
