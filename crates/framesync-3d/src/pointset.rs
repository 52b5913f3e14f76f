use serde::{Deserialize, Serialize};

/// Error types for point set construction.
#[derive(thiserror::Error, Debug)]
pub enum PointSetError {
    /// The per-axis columns do not have the same length.
    #[error("Mismatched column lengths: x ({0}), y ({1}), z ({2})")]
    MismatchedColumns(usize, usize, usize),
}

/// An ordered set of 3D points.
///
/// The order of the points is meaningful: registration results keep the same cardinality and
/// order as the input set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    // The points in the set.
    points: Vec<[f64; 3]>,
}

impl PointSet {
    /// Create a new point set from a vector of points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Create a point set from per-axis coordinate columns.
    ///
    /// # Arguments
    ///
    /// * `x` - The x coordinates.
    /// * `y` - The y coordinates.
    /// * `z` - The z coordinates.
    ///
    /// Example:
    ///
    /// ```
    /// use framesync_3d::pointset::PointSet;
    ///
    /// let set = PointSet::from_columns(&[0.0, 1.0], &[2.0, 3.0], &[4.0, 5.0]).unwrap();
    /// assert_eq!(set.points(), &[[0.0, 2.0, 4.0], [1.0, 3.0, 5.0]]);
    /// ```
    pub fn from_columns(x: &[f64], y: &[f64], z: &[f64]) -> Result<Self, PointSetError> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(PointSetError::MismatchedColumns(x.len(), y.len(), z.len()));
        }

        let points = x
            .iter()
            .zip(y.iter())
            .zip(z.iter())
            .map(|((&x, &y), &z)| [x, y, z])
            .collect();

        Ok(Self { points })
    }

    /// Stack several point sets into one, keeping the order of the sets and of their points.
    pub fn concat(sets: &[PointSet]) -> Self {
        let num_points = sets.iter().map(|s| s.len()).sum();
        let mut points = Vec::with_capacity(num_points);
        for set in sets {
            points.extend_from_slice(&set.points);
        }
        Self { points }
    }

    /// Get the number of points in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the set.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the set and return the points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Check that every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.points.iter().flatten().all(|v| v.is_finite())
    }

    /// Compute the arithmetic mean of the points, or `None` for an empty set.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        centroid(&self.points)
    }
}

impl From<Vec<[f64; 3]>> for PointSet {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}

/// Compute the arithmetic mean of a set of points, or `None` for an empty slice.
pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }

    let mut sum = [0.0; 3];
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }

    let n = points.len() as f64;
    Some([sum[0] / n, sum[1] / n, sum[2] / n])
}
