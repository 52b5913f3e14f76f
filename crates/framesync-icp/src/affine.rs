use serde::{Deserialize, Serialize};

use crate::{error::IcpError, transform::AffineTransform};

/// Closed-form least-squares affine estimator.
///
/// With the homogeneous source points as columns of `A` (4xN) and the targets as columns of `B`,
/// the estimate is `M = B * pinv(A)`: the minimum-norm least-squares solution. Scale and shear
/// are unconstrained, and rank-deficient inputs are never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineSolver {
    /// Relative cutoff for small singular values of the pseudoinverse.
    ///
    /// Singular values at or below `rcond * σ_max` are treated as zero.
    pub rcond: f64,
}

impl Default for AffineSolver {
    fn default() -> Self {
        Self { rcond: 1e-15 }
    }
}

impl AffineSolver {
    /// Estimate the affine map sending `points_src` onto `points_dst`.
    ///
    /// # Arguments
    ///
    /// * `points_src` - Old positions, plain 3D coordinates.
    /// * `points_dst` - Targets, one per source point.
    pub fn estimate(
        &self,
        points_src: &[[f64; 3]],
        points_dst: &[[f64; 3]],
    ) -> Result<AffineTransform, IcpError> {
        if points_src.len() != points_dst.len() {
            return Err(IcpError::InvalidInput(format!(
                "mismatched correspondences: source ({}) != target ({})",
                points_src.len(),
                points_dst.len()
            )));
        }

        if points_src.is_empty() {
            return Err(IcpError::InvalidInput(
                "affine estimation needs at least one correspondence".to_string(),
            ));
        }

        // homogeneous source points as rows, P = A^T (Nx4)
        let n = points_src.len();
        let p = faer::Mat::<f64>::from_fn(n, 4, |i, j| if j < 3 { points_src[i][j] } else { 1.0 });

        // P = U S V^T  =>  pinv(A) = pinv(P^T) = U S^+ V^T
        let svd = p.thin_svd();
        let u = svd.u();
        let v = svd.v();
        let s = svd.s_diagonal();
        let rank = s.nrows();

        let s_max = (0..rank).map(|k| s.read(k)).fold(0.0, f64::max);
        let cutoff = self.rcond * s_max;
        let s_inv = (0..rank)
            .map(|k| {
                let sk = s.read(k);
                if sk > cutoff {
                    1.0 / sk
                } else {
                    0.0
                }
            })
            .collect::<Vec<_>>();

        // C = B_xyz * U (3 x rank)
        let mut c = vec![[0.0; 3]; rank];
        for (i, p_dst) in points_dst.iter().enumerate() {
            for (k, ck) in c.iter_mut().enumerate() {
                let uik = u.read(i, k);
                ck[0] += p_dst[0] * uik;
                ck[1] += p_dst[1] * uik;
                ck[2] += p_dst[2] * uik;
            }
        }

        // M = C * S^+ * V^T (3x4)
        let mut matrix = [[0.0; 4]; 3];
        for (r, row) in matrix.iter_mut().enumerate() {
            for (col, val) in row.iter_mut().enumerate() {
                *val = (0..rank)
                    .map(|k| c[k][r] * s_inv[k] * v.read(col, k))
                    .sum();
            }
        }

        Ok(AffineTransform { matrix })
    }
}
