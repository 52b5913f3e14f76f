use serde::{Deserialize, Serialize};

use crate::pointset::centroid;

/// Error types for the normalization utilities.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NormalizeError {
    /// The trajectory used to estimate the scale is empty.
    #[error("Cannot estimate a scale from an empty trajectory")]
    EmptyTrack,

    /// The scale radius is not usable as a divisor.
    #[error("Invalid scale radius {0}")]
    InvalidScale(f64),
}

/// Extent of a joint trajectory: its mean position and mean distance to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryScale {
    /// Mean distance of the trajectory samples to `center`.
    pub radius: f64,
    /// Mean position of the trajectory.
    pub center: [f64; 3],
}

impl TrajectoryScale {
    /// Return a copy with the radius multiplied by `radius_factor` and `center_offset` added to
    /// the center.
    pub fn adjusted(&self, radius_factor: f64, center_offset: [f64; 3]) -> Self {
        Self {
            radius: self.radius * radius_factor,
            center: [
                self.center[0] + center_offset[0],
                self.center[1] + center_offset[1],
                self.center[2] + center_offset[2],
            ],
        }
    }
}

/// Estimate the scale of a single joint tracked over time.
///
/// # Arguments
///
/// * `track` - The positions of one joint, one sample per frame.
///
/// # Returns
///
/// The mean position of the track and the mean Euclidean distance of the samples to it.
pub fn trajectory_scale(track: &[[f64; 3]]) -> Result<TrajectoryScale, NormalizeError> {
    let center = centroid(track).ok_or(NormalizeError::EmptyTrack)?;

    let radius = track
        .iter()
        .map(|p| {
            ((p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2) + (p[2] - center[2]).powi(2))
                .sqrt()
        })
        .sum::<f64>()
        / track.len() as f64;

    Ok(TrajectoryScale { radius, center })
}

/// Bring points into the unit frame described by `scale`.
///
/// Every point is mapped as `p / radius - center / radius`.
pub fn normalize_points(
    points: &[[f64; 3]],
    scale: &TrajectoryScale,
) -> Result<Vec<[f64; 3]>, NormalizeError> {
    if !scale.radius.is_finite() || scale.radius <= 0.0 {
        return Err(NormalizeError::InvalidScale(scale.radius));
    }

    let r = scale.radius;
    let c = [scale.center[0] / r, scale.center[1] / r, scale.center[2] / r];

    Ok(points
        .iter()
        .map(|p| [p[0] / r - c[0], p[1] / r - c[1], p[2] / r - c[2]])
        .collect())
}

/// Negate the selected axes of every point in place.
pub fn flip_axes(points: &mut [[f64; 3]], axes: [bool; 3]) {
    for p in points.iter_mut() {
        for (v, flip) in p.iter_mut().zip(axes) {
            if flip {
                *v = -*v;
            }
        }
    }
}
