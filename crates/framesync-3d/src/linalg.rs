/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix (or any 3x3 linear map).
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use framesync_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points);
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    if src_points.is_empty() {
        return;
    }

    let dst_r_src_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| dst_r_src[i][j]);

    // create view of the source points
    let points_in_src = {
        // SAFETY: [[f64; 3]] is laid out as a contiguous run of 3 * len f64 values
        let src_points_slice = unsafe {
            std::slice::from_raw_parts(src_points.as_ptr() as *const f64, src_points.len() * 3)
        };
        // Nx3 matrix where each row represents a 3D point
        faer::mat::from_row_major_slice(src_points_slice, src_points.len(), 3)
    };

    // create a mutable view of the destination points
    let mut points_in_dst = {
        // SAFETY: same layout argument as for the source points
        let dst_points_slice = unsafe {
            std::slice::from_raw_parts_mut(
                dst_points.as_mut_ptr() as *mut f64,
                dst_points.len() * 3,
            )
        };
        // 3xN matrix where each column represents a 3D point
        faer::mat::from_column_major_slice_mut(dst_points_slice, 3, dst_points.len())
    };

    faer::linalg::matmul::matmul(
        points_in_dst.as_mut(),
        dst_r_src_mat.as_ref(),
        points_in_src.transpose(),
        None,
        1.0,
        faer::Parallelism::None,
    );

    for mut col in points_in_dst.col_iter_mut() {
        for (i, t) in dst_t_src.iter().enumerate() {
            col.write(i, col.read(i) + t);
        }
    }
}

/// Transform a set of points using a 3x4 affine matrix `[A | t]`.
///
/// Each point is mapped as `A * p + t`, the same as multiplying the homogeneous point `[p; 1]`.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
pub fn transform_points_affine(
    src_points: &[[f64; 3]],
    dst_m_src: &[[f64; 4]; 3],
    dst_points: &mut [[f64; 3]],
) {
    let linear = [
        [dst_m_src[0][0], dst_m_src[0][1], dst_m_src[0][2]],
        [dst_m_src[1][0], dst_m_src[1][1], dst_m_src[1][2]],
        [dst_m_src[2][0], dst_m_src[2][1], dst_m_src[2][2]],
    ];
    let translation = [dst_m_src[0][3], dst_m_src[1][3], dst_m_src[2][3]];
    transform_points(src_points, &linear, &translation, dst_points);
}

/// Multiply two 3x3 matrices, `out = a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// Multiply a 3x3 matrix by a 3-vector.
pub fn matvec33(a: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        a[0][0] * v[0] + a[0][1] * v[1] + a[0][2] * v[2],
        a[1][0] * v[0] + a[1][1] * v[1] + a[1][2] * v[2],
        a[2][0] * v[0] + a[2][1] * v[1] + a[2][2] * v[2],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn determinant33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}
