use crate::spatial_index::SpatialIndex;

/// Sum of squared nearest-neighbour distances from `points` to the indexed reference set.
///
/// This is the registration residual used to rank candidate alignments. It is never negative
/// and is zero only when every point coincides with a reference point.
///
/// # Arguments
///
/// * `index` - Index over the reference set.
/// * `points` - Aligned points.
pub fn registration_cost(index: &SpatialIndex, points: &[[f64; 3]]) -> f64 {
    index
        .query(points)
        .iter()
        .map(|nn| nn.squared_distance)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IcpError;
    use approx::assert_relative_eq;

    #[test]
    fn test_registration_cost() -> Result<(), IcpError> {
        let index = SpatialIndex::build(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])?;

        assert_eq!(registration_cost(&index, &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]), 0.0);

        // 0.1^2 + 0.2^2 + 0.5^2
        let cost = registration_cost(&index, &[[0.1, 0.0, 0.0], [1.0, 0.2, 0.0], [0.0, 0.0, 0.5]]);
        assert_relative_eq!(cost, 0.3, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_registration_cost_non_negative() -> Result<(), IcpError> {
        let reference = (0..50)
            .map(|_| [rand::random::<f64>(), rand::random::<f64>(), 0.0])
            .collect::<Vec<_>>();
        let index = SpatialIndex::build(&reference)?;
        let points = (0..20)
            .map(|_| {
                [
                    rand::random::<f64>() * 4.0 - 2.0,
                    rand::random::<f64>() * 4.0 - 2.0,
                    rand::random::<f64>() * 4.0 - 2.0,
                ]
            })
            .collect::<Vec<_>>();
        assert!(registration_cost(&index, &points) >= 0.0);
        Ok(())
    }
}
