//! Search for the temporal offset that best aligns two capture streams.
//!
//! For every candidate offset a caller-supplied provider builds the reference and source point
//! sets, a fresh [`IcpEngine`] registers them and the registration cost is recorded. The
//! candidate with the lowest cost wins. A candidate whose registration fails is recorded with
//! [`SENTINEL_COST`] and the sweep moves on.

use framesync_3d::pointset::PointSet;
use serde::Serialize;

use crate::{
    engine::{IcpConfig, IcpEngine, RegistrationState},
    error::IcpError,
};

/// Cost recorded for a candidate whose registration failed.
pub const SENTINEL_COST: f64 = f64::INFINITY;

/// Error types for the sweep helpers.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SweepError {
    /// The offset step is not positive.
    #[error("Offset step must be positive, got {0}")]
    InvalidStep(i64),

    /// The offset range is negative or too large to step through.
    #[error("Offset range must be non-negative and leave room for one more step, got {0}")]
    InvalidRange(i64),
}

/// Build the candidate offsets `[-k*step, ..., -step, 0, step, ..., k*step]`.
///
/// `k` is the largest integer with `k * step < range + step`, so the outermost candidates may
/// overshoot `range` when it is not a multiple of `step`.
///
/// Example:
///
/// ```
/// use framesync_icp::sweep::symmetric_offsets;
///
/// assert_eq!(symmetric_offsets(4, 2).unwrap(), vec![-4, -2, 0, 2, 4]);
/// ```
pub fn symmetric_offsets(range: i64, step: i64) -> Result<Vec<i64>, SweepError> {
    if step <= 0 {
        return Err(SweepError::InvalidStep(step));
    }
    if range < 0 {
        return Err(SweepError::InvalidRange(range));
    }

    let limit = range
        .checked_add(step)
        .ok_or(SweepError::InvalidRange(range))?;

    let positive = (1i64..)
        .map_while(|k| k.checked_mul(step))
        .take_while(|&o| o < limit)
        .collect::<Vec<_>>();

    let mut offsets = positive.iter().rev().map(|o| -o).collect::<Vec<_>>();
    offsets.push(0);
    offsets.extend(positive);

    Ok(offsets)
}

/// Outcome of one candidate offset.
#[derive(Debug, Clone, Serialize)]
pub struct SweepCandidate {
    /// Temporal offset of the candidate.
    pub offset: i64,
    /// Registration cost, [`SENTINEL_COST`] when the candidate failed.
    pub cost: f64,
    /// Terminal state of the registration, `None` when no engine could be built.
    pub state: Option<RegistrationState>,
    /// Iterations consumed by the registration.
    pub num_iterations: usize,
    /// Reason of the failure, if any.
    pub error: Option<String>,
}

impl SweepCandidate {
    fn failed(offset: i64, state: Option<RegistrationState>, error: String) -> Self {
        Self {
            offset,
            cost: SENTINEL_COST,
            state,
            num_iterations: 0,
            error: Some(error),
        }
    }
}

/// All candidates of a sweep, in the order they were evaluated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepResult {
    /// Evaluated candidates.
    pub candidates: Vec<SweepCandidate>,
}

impl SweepResult {
    /// The candidate with the lowest finite cost. The first one wins on ties.
    pub fn best(&self) -> Option<&SweepCandidate> {
        let mut best: Option<&SweepCandidate> = None;
        for candidate in self.candidates.iter().filter(|c| c.cost.is_finite()) {
            match best {
                Some(b) if candidate.cost >= b.cost => {}
                _ => best = Some(candidate),
            }
        }
        best
    }

    /// The costs of every candidate, in evaluation order.
    pub fn costs(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.cost).collect()
    }

    /// The offsets of every candidate, in evaluation order.
    pub fn offsets(&self) -> Vec<i64> {
        self.candidates.iter().map(|c| c.offset).collect()
    }
}

/// Registration-cost driven search over candidate temporal offsets.
#[derive(Debug, Clone, Default)]
pub struct OffsetSweep {
    /// Parameters of every registration pass.
    pub config: IcpConfig,
}

impl OffsetSweep {
    /// Create a sweep running every candidate with `config`.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// Score one pair of point sets.
    pub fn evaluate(
        &self,
        reference: &PointSet,
        source: &PointSet,
    ) -> Result<(f64, RegistrationState, usize), IcpError> {
        let mut engine = IcpEngine::new(reference, source)?;
        let result = engine.register_with_config(&self.config)?;
        let cost = engine.cost()?;
        Ok((cost, result.state, result.num_iterations))
    }

    /// Evaluate every offset in order.
    ///
    /// # Arguments
    ///
    /// * `offsets` - Candidate offsets.
    /// * `provider` - Builds the `(reference, source)` point sets of an offset.
    pub fn run<F, E>(&self, offsets: &[i64], mut provider: F) -> SweepResult
    where
        F: FnMut(i64) -> Result<(PointSet, PointSet), E>,
        E: std::fmt::Display,
    {
        let mut candidates = Vec::with_capacity(offsets.len());

        for &offset in offsets {
            let candidate = match provider(offset) {
                Err(err) => {
                    log::warn!("offset {offset}: cannot build point sets: {err}");
                    SweepCandidate::failed(offset, None, err.to_string())
                }
                Ok((reference, source)) => match self.evaluate(&reference, &source) {
                    Ok((cost, state, num_iterations)) => {
                        log::debug!(
                            "offset {offset}: cost {cost:e} ({state:?} after {num_iterations} iterations)"
                        );
                        SweepCandidate {
                            offset,
                            cost,
                            state: Some(state),
                            num_iterations,
                            error: None,
                        }
                    }
                    Err(err) => {
                        log::warn!("offset {offset}: registration failed: {err}");
                        let state = match &err {
                            IcpError::InvalidInput(_) => None,
                            _ => Some(RegistrationState::Error),
                        };
                        SweepCandidate::failed(offset, state, err.to_string())
                    }
                },
            };
            candidates.push(candidate);
        }

        let result = SweepResult { candidates };
        match result.best() {
            Some(best) => log::info!(
                "best offset {} with cost {:e} out of {} candidates",
                best.offset,
                best.cost,
                result.candidates.len()
            ),
            None => log::info!("no candidate out of {} registered", result.candidates.len()),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RegistrationMode;

    fn shifted(points: &[[f64; 3]], dx: f64) -> PointSet {
        PointSet::new(points.iter().map(|p| [p[0] + dx, p[1], p[2]]).collect())
    }

    #[test]
    fn test_symmetric_offsets() -> Result<(), SweepError> {
        assert_eq!(symmetric_offsets(0, 2)?, vec![0]);
        assert_eq!(symmetric_offsets(6, 2)?, vec![-6, -4, -2, 0, 2, 4, 6]);
        assert_eq!(symmetric_offsets(5, 2)?, vec![-6, -4, -2, 0, 2, 4, 6]);
        assert_eq!(symmetric_offsets(5, 0), Err(SweepError::InvalidStep(0)));
        assert_eq!(symmetric_offsets(-1, 1), Err(SweepError::InvalidRange(-1)));
        assert_eq!(
            symmetric_offsets(i64::MAX - 1, 2),
            Err(SweepError::InvalidRange(i64::MAX - 1))
        );
        assert_eq!(symmetric_offsets(0, i64::MAX)?, vec![0]);
        Ok(())
    }

    #[test]
    fn test_best_skips_sentinel_and_keeps_first() {
        let candidate = |offset, cost| SweepCandidate {
            offset,
            cost,
            state: Some(RegistrationState::Converged),
            num_iterations: 1,
            error: None,
        };
        let result = SweepResult {
            candidates: vec![
                candidate(-2, SENTINEL_COST),
                candidate(-1, 0.5),
                candidate(0, 0.25),
                candidate(1, 0.25),
            ],
        };
        let best = result.best().map(|c| c.offset);
        assert_eq!(best, Some(0));
        assert_eq!(result.offsets(), vec![-2, -1, 0, 1]);
        assert!(SweepResult::default().best().is_none());
    }

    #[test]
    fn test_bad_candidates_do_not_abort() {
        let reference = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 3.0],
            [1.0, 1.0, 1.0],
        ];

        let sweep = OffsetSweep::new(IcpConfig {
            mode: RegistrationMode::Rigid,
            ..Default::default()
        });

        let result = sweep.run(&[-1, 0, 1, 2], |offset| match offset {
            // too few points for the rigid solver
            -1 => Ok((
                PointSet::new(reference.clone()),
                PointSet::new(reference[..2].to_vec()),
            )),
            0 => Ok((PointSet::new(reference.clone()), shifted(&reference, 0.0))),
            1 => Err("missing frame"),
            _ => Ok((PointSet::new(reference.clone()), PointSet::default())),
        });

        let costs = result.costs();
        assert_eq!(costs.len(), 4);
        assert_eq!(costs[0], SENTINEL_COST);
        assert_eq!(result.candidates[0].state, Some(RegistrationState::Error));
        assert_eq!(costs[1], 0.0);
        assert_eq!(costs[2], SENTINEL_COST);
        assert!(result.candidates[2].state.is_none());
        assert_eq!(costs[3], SENTINEL_COST);
        assert_eq!(result.best().map(|c| c.offset), Some(0));
    }

    #[test]
    fn test_overflowing_candidate_gets_sentinel() {
        let reference = vec![
            [1e160, 0.0, 0.0],
            [0.0, 2e160, 0.0],
            [0.0, 0.0, 3e160],
            [1e160, 1e160, 1e160],
        ];
        let source = reference
            .iter()
            .map(|p| [p[0] * 1.5 + 1e159, p[1] * 0.5, p[2]])
            .collect::<Vec<_>>();

        let sweep = OffsetSweep::default();
        let result = sweep.run(&[0], |_| {
            Ok::<_, String>((PointSet::new(reference.clone()), PointSet::new(source.clone())))
        });

        let candidate = &result.candidates[0];
        assert_eq!(candidate.cost, SENTINEL_COST);
        assert_eq!(candidate.state, Some(RegistrationState::Error));
        assert!(candidate
            .error
            .as_deref()
            .is_some_and(|e| e.contains("Numeric fault")));
        assert!(result.best().is_none());
    }
}
