use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use crate::error::IcpError;

/// Nearest reference point of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Squared Euclidean distance to the reference point.
    pub squared_distance: f64,
    /// Index of the reference point in the indexed set.
    pub index: usize,
}

impl Neighbor {
    /// Euclidean distance to the reference point.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.squared_distance.sqrt()
    }
}

/// Static nearest-neighbour index over a reference point set.
///
/// The index is built once and never mutated; a different reference set needs a new index.
pub struct SpatialIndex {
    points: Vec<[f64; 3]>,
    kdtree: ImmutableKdTree<f64, u32, 3, 32>,
}

impl SpatialIndex {
    /// Build the index over a non-empty set of finite points.
    pub fn build(points: &[[f64; 3]]) -> Result<Self, IcpError> {
        if points.is_empty() {
            return Err(IcpError::InvalidInput(
                "cannot index an empty reference set".to_string(),
            ));
        }

        if u32::try_from(points.len()).is_err() {
            return Err(IcpError::InvalidInput(format!(
                "reference set too large to index: {} points",
                points.len()
            )));
        }

        if let Some(i) = points
            .iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(IcpError::InvalidInput(format!(
                "reference point {i} has non-finite coordinates"
            )));
        }

        let kdtree = ImmutableKdTree::new_from_slice(points);

        Ok(Self {
            points: points.to_vec(),
            kdtree,
        })
    }

    /// Number of indexed reference points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, an index is never built over an empty set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed reference points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Find the nearest reference point of a single query point.
    ///
    /// When several reference points are at exactly the same minimal distance the one with the
    /// lowest index is returned.
    pub fn nearest(&self, query: &[f64; 3]) -> Neighbor {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(query);
        let mut best = Neighbor {
            squared_distance: squared_distance(query, &self.points[nn.item as usize]),
            index: nn.item as usize,
        };

        // collect the candidates tied with the kd-tree answer
        let radius = best.squared_distance * (1.0 + 1e-9) + f64::EPSILON;
        for candidate in self
            .kdtree
            .within_unsorted::<SquaredEuclidean>(query, radius)
        {
            let index = candidate.item as usize;
            let d = squared_distance(query, &self.points[index]);
            if d < best.squared_distance || (d == best.squared_distance && index < best.index) {
                best = Neighbor {
                    squared_distance: d,
                    index,
                };
            }
        }

        best
    }

    /// Find the nearest reference point of every query point, in query order.
    pub fn query(&self, points: &[[f64; 3]]) -> Vec<Neighbor> {
        points.iter().map(|p| self.nearest(p)).collect()
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("num_points", &self.points.len())
            .finish()
    }
}

/// Squared Euclidean distance between two points.
#[inline]
pub(crate) fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}
