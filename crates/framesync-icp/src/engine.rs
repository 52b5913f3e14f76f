use framesync_3d::pointset::PointSet;
use serde::{Deserialize, Serialize};

use crate::{
    affine::AffineSolver,
    cost::registration_cost,
    error::IcpError,
    rigid::RigidSolver,
    spatial_index::SpatialIndex,
    transform::{AffineTransform, RigidTransform, Transform},
};

/// Default bound on the L1 change of the working points below which a pass has converged.
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 1e-9;

/// Transform family estimated at every iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// Rotation and translation.
    #[default]
    Rigid,
    /// General affine map, allowing the two rigs to disagree on scale.
    Affine,
}

/// Lifecycle of an [`IcpEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Built, no pass has run yet.
    Initialized,
    /// A pass is running.
    Iterating,
    /// The working points stopped moving.
    Converged,
    /// The iteration cap was hit. This is a normal outcome.
    MaxIterationsReached,
    /// The pass failed.
    Error,
}

impl RegistrationState {
    /// Whether a pass completed and the aligned points can be scored.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            RegistrationState::Converged | RegistrationState::MaxIterationsReached
        )
    }
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance on Σ|old - new| over every coordinate of the working points.
    pub tolerance: f64,
}

impl Default for IcpConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: DEFAULT_RESIDUAL_TOLERANCE,
        }
    }
}

/// Full parameter set of one registration pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Transform family.
    pub mode: RegistrationMode,
    /// Termination policy.
    pub criteria: IcpConvergenceCriteria,
    /// Parameters of the rigid solver.
    pub rigid: RigidSolver,
    /// Parameters of the affine solver.
    pub affine: AffineSolver,
}

/// Result of a completed registration pass.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Aligned points, same count and order as the source set.
    pub points: Vec<[f64; 3]>,
    /// Terminal state, either converged or capped.
    pub state: RegistrationState,
    /// Number of iterations consumed.
    pub num_iterations: usize,
    /// Mapping from the original source points to `points`.
    pub transform: Transform,
    /// Transform estimated by the last iteration.
    pub last_transform: Transform,
}

/// Iterative closest point registration of a source set onto a fixed reference set.
///
/// The engine owns the index over the reference set and a private copy of the source points.
/// Exactly one pass runs per instance; the cost can be queried any number of times after it.
///
/// Example:
///
/// ```
/// use framesync_3d::pointset::PointSet;
/// use framesync_icp::{IcpConvergenceCriteria, IcpEngine, RegistrationMode, RegistrationState};
///
/// let reference = PointSet::new(vec![
///     [0.0, 0.0, 0.0],
///     [1.0, 0.0, 0.0],
///     [0.0, 1.0, 0.0],
///     [0.0, 0.0, 1.0],
/// ]);
/// let mut engine = IcpEngine::new(&reference, &reference).unwrap();
/// let result = engine
///     .register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default())
///     .unwrap();
/// assert_eq!(result.state, RegistrationState::Converged);
/// assert_eq!(engine.cost().unwrap(), 0.0);
/// ```
#[derive(Debug)]
pub struct IcpEngine {
    index: SpatialIndex,
    source: Vec<[f64; 3]>,
    working: Vec<[f64; 3]>,
    state: RegistrationState,
    num_iterations: usize,
    last_transform: Option<Transform>,
    transform: Option<Transform>,
}

impl IcpEngine {
    /// Create an engine for one registration of `source` onto `reference`.
    ///
    /// # Errors
    ///
    /// [`IcpError::InvalidInput`] if either set is empty or has non-finite coordinates.
    pub fn new(reference: &PointSet, source: &PointSet) -> Result<Self, IcpError> {
        if source.is_empty() {
            return Err(IcpError::InvalidInput("source set is empty".to_string()));
        }
        if !source.is_finite() {
            return Err(IcpError::InvalidInput(
                "source set has non-finite coordinates".to_string(),
            ));
        }

        // build kdtree for reference points to speed up the nearest neighbor search
        let index = SpatialIndex::build(reference.points())?;

        Ok(Self {
            index,
            source: source.points().to_vec(),
            working: source.points().to_vec(),
            state: RegistrationState::Initialized,
            num_iterations: 0,
            last_transform: None,
            transform: None,
        })
    }

    /// Current state of the engine.
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// The index over the reference set.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// The reference points.
    pub fn reference(&self) -> &[[f64; 3]] {
        self.index.points()
    }

    /// The source points as given at construction.
    pub fn source(&self) -> &[[f64; 3]] {
        &self.source
    }

    /// Transform estimated by the last completed iteration, if any.
    pub fn last_transform(&self) -> Option<&Transform> {
        self.last_transform.as_ref()
    }

    /// Run the registration pass with default solver parameters.
    ///
    /// # Arguments
    ///
    /// * `mode` - Transform family estimated at every iteration.
    /// * `criteria` - Iteration cap and residual tolerance.
    pub fn register(
        &mut self,
        mode: RegistrationMode,
        criteria: &IcpConvergenceCriteria,
    ) -> Result<RegistrationResult, IcpError> {
        let config = IcpConfig {
            mode,
            criteria: criteria.clone(),
            ..Default::default()
        };
        self.register_with_config(&config)
    }

    /// Run the registration pass.
    ///
    /// Every iteration matches each working point to its nearest reference point, estimates a
    /// transform from the working points onto the matches and applies it. The pass converges
    /// once the elementwise L1 change of the working points drops below the tolerance.
    ///
    /// # Errors
    ///
    /// * [`IcpError::AlreadyRegistered`] if a pass already ran on this engine.
    /// * [`IcpError::InvalidInput`] for a zero iteration cap.
    /// * [`IcpError::DegenerateInput`] from the rigid solver.
    /// * [`IcpError::NumericFault`] when distances or a solver yield non-finite values.
    ///
    /// The last two leave the engine in [`RegistrationState::Error`].
    pub fn register_with_config(
        &mut self,
        config: &IcpConfig,
    ) -> Result<RegistrationResult, IcpError> {
        if self.state != RegistrationState::Initialized {
            return Err(IcpError::AlreadyRegistered);
        }

        if config.criteria.max_iterations == 0 {
            return Err(IcpError::InvalidInput(
                "max_iterations must be positive".to_string(),
            ));
        }

        self.state = RegistrationState::Iterating;

        match self.iterate(config) {
            Ok(state) => {
                self.state = state;
                self.result()
            }
            Err(err) => {
                log::debug!("ICP failed after {} iterations: {}", self.num_iterations, err);
                self.state = RegistrationState::Error;
                Err(err)
            }
        }
    }

    fn iterate(&mut self, config: &IcpConfig) -> Result<RegistrationState, IcpError> {
        let mut transform = match config.mode {
            RegistrationMode::Rigid => Transform::Rigid(RigidTransform::identity()),
            RegistrationMode::Affine => Transform::Affine(AffineTransform::identity()),
        };

        for i in 0..config.criteria.max_iterations {
            // NOTE: for debugging purposes, we measure the time taken for each iteration
            let now = std::time::Instant::now();

            // correspondences are rebuilt from scratch every iteration
            let neighbors = self.index.query(&self.working);

            // overflowing distances make every reference point tie, the matching is meaningless
            if let Some(nn) = neighbors.iter().find(|nn| !nn.squared_distance.is_finite()) {
                return Err(IcpError::NumericFault(format!(
                    "non-finite nearest-neighbour distance {} at iteration {i}",
                    nn.squared_distance
                )));
            }

            let targets = neighbors
                .iter()
                .map(|nn| self.index.points()[nn.index])
                .collect::<Vec<_>>();

            let delta = match config.mode {
                RegistrationMode::Rigid => {
                    Transform::Rigid(config.rigid.estimate(&self.working, &targets)?)
                }
                RegistrationMode::Affine => {
                    Transform::Affine(config.affine.estimate(&self.working, &targets)?)
                }
            };

            if !delta.is_finite() {
                return Err(IcpError::NumericFault(format!(
                    "non-finite transform at iteration {i}"
                )));
            }

            let new_points = delta.apply(&self.working);

            let residual = self
                .working
                .iter()
                .zip(new_points.iter())
                .flat_map(|(old, new)| old.iter().zip(new.iter()).map(|(a, b)| (a - b).abs()))
                .sum::<f64>();

            if !residual.is_finite() {
                return Err(IcpError::NumericFault(format!(
                    "non-finite residual at iteration {i}"
                )));
            }

            transform = transform.then(&delta);
            self.working = new_points;
            self.last_transform = Some(delta);
            self.transform = Some(transform);
            self.num_iterations += 1;

            log::debug!(
                "Iteration: {} residual: {:e} elapsed: {:?}",
                i,
                residual,
                now.elapsed()
            );

            if residual < config.criteria.tolerance {
                log::debug!("ICP converged in {} iterations", self.num_iterations);
                return Ok(RegistrationState::Converged);
            }
        }

        log::debug!(
            "ICP reached the cap of {} iterations",
            config.criteria.max_iterations
        );

        Ok(RegistrationState::MaxIterationsReached)
    }

    /// Result of the completed pass.
    ///
    /// # Errors
    ///
    /// [`IcpError::NotRegistered`] if no pass completed.
    pub fn result(&self) -> Result<RegistrationResult, IcpError> {
        if !self.state.is_complete() {
            return Err(IcpError::NotRegistered);
        }

        match (self.transform, self.last_transform) {
            (Some(transform), Some(last_transform)) => Ok(RegistrationResult {
                points: self.working.clone(),
                state: self.state,
                num_iterations: self.num_iterations,
                transform,
                last_transform,
            }),
            _ => Err(IcpError::NotRegistered),
        }
    }

    /// Sum of squared distances from the aligned points to their nearest reference points.
    ///
    /// # Errors
    ///
    /// * [`IcpError::NotRegistered`] if no pass completed.
    /// * [`IcpError::NumericFault`] if the sum overflows.
    pub fn cost(&self) -> Result<f64, IcpError> {
        if !self.state.is_complete() {
            return Err(IcpError::NotRegistered);
        }

        let cost = registration_cost(&self.index, &self.working);
        if !cost.is_finite() {
            return Err(IcpError::NumericFault(format!("non-finite cost {cost}")));
        }
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_random_points(num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| {
                [
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                ]
            })
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        let points = PointSet::new(vec![[0.0, 0.0, 0.0]]);
        let empty = PointSet::default();
        assert!(matches!(
            IcpEngine::new(&empty, &points),
            Err(IcpError::InvalidInput(_))
        ));
        assert!(matches!(
            IcpEngine::new(&points, &empty),
            Err(IcpError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_finite_source() {
        let reference = PointSet::new(vec![[0.0, 0.0, 0.0]]);
        let source = PointSet::new(vec![[0.0, f64::INFINITY, 0.0]]);
        assert!(matches!(
            IcpEngine::new(&reference, &source),
            Err(IcpError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_not_registered() -> Result<(), IcpError> {
        let points = PointSet::new(create_random_points(10));
        let engine = IcpEngine::new(&points, &points)?;
        assert_eq!(engine.state(), RegistrationState::Initialized);
        assert_eq!(engine.cost(), Err(IcpError::NotRegistered));
        assert_eq!(engine.cost(), Err(IcpError::NotRegistered));
        assert!(matches!(engine.result(), Err(IcpError::NotRegistered)));
        assert!(engine.last_transform().is_none());
        Ok(())
    }

    #[test]
    fn test_zero_cap() -> Result<(), IcpError> {
        let points = PointSet::new(create_random_points(10));
        let mut engine = IcpEngine::new(&points, &points)?;
        let criteria = IcpConvergenceCriteria {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            engine.register(RegistrationMode::Rigid, &criteria),
            Err(IcpError::InvalidInput(_))
        ));
        assert_eq!(engine.state(), RegistrationState::Initialized);
        Ok(())
    }

    #[test]
    fn test_identity_converges_first_iteration() -> Result<(), IcpError> {
        let points = PointSet::new(create_random_points(50));
        let mut engine = IcpEngine::new(&points, &points)?;
        let result = engine.register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default())?;

        assert_eq!(result.state, RegistrationState::Converged);
        assert_eq!(result.num_iterations, 1);
        assert_eq!(result.points, points.points());
        match result.transform {
            Transform::Rigid(t) => assert_eq!(t, RigidTransform::identity()),
            Transform::Affine(_) => panic!("rigid pass produced an affine transform"),
        }
        assert_eq!(engine.cost()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_single_pass_per_engine() -> Result<(), IcpError> {
        let points = PointSet::new(create_random_points(10));
        let mut engine = IcpEngine::new(&points, &points)?;
        engine.register(RegistrationMode::Affine, &IcpConvergenceCriteria::default())?;
        assert!(matches!(
            engine.register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default()),
            Err(IcpError::AlreadyRegistered)
        ));
        Ok(())
    }

    #[test]
    fn test_degenerate_rigid_sets_error_state() -> Result<(), IcpError> {
        let reference = PointSet::new(create_random_points(10));
        let source = PointSet::new(vec![[0.5, 0.5, 0.5], [0.1, 0.2, 0.3]]);
        let mut engine = IcpEngine::new(&reference, &source)?;

        let res = engine.register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default());
        assert_eq!(
            res.err(),
            Some(IcpError::DegenerateInput {
                required: 3,
                actual: 2
            })
        );
        assert_eq!(engine.state(), RegistrationState::Error);
        assert_eq!(engine.cost(), Err(IcpError::NotRegistered));
        Ok(())
    }

    #[test]
    fn test_affine_tolerates_few_points() -> Result<(), IcpError> {
        let reference = PointSet::new(create_random_points(10));
        let source = PointSet::new(vec![[0.5, 0.5, 0.5], [0.1, 0.2, 0.3]]);
        let mut engine = IcpEngine::new(&reference, &source)?;

        let result = engine.register(RegistrationMode::Affine, &IcpConvergenceCriteria::default())?;
        assert!(result.state.is_complete());
        assert!(engine.cost()? >= 0.0);
        Ok(())
    }

    #[test]
    fn test_caller_data_untouched() -> Result<(), IcpError> {
        let reference = PointSet::new(create_random_points(20));
        let source_points = create_random_points(20);
        let source = PointSet::new(source_points.clone());

        let mut engine = IcpEngine::new(&reference, &source)?;
        engine.register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default())?;

        assert_eq!(source.points(), source_points.as_slice());
        assert_eq!(engine.source(), source_points.as_slice());
        Ok(())
    }

    #[test]
    fn test_transform_maps_source_to_result() -> Result<(), IcpError> {
        let reference = PointSet::new(create_random_points(40));
        let source = PointSet::new(create_random_points(40));

        let mut engine = IcpEngine::new(&reference, &source)?;
        let criteria = IcpConvergenceCriteria {
            max_iterations: 20,
            ..Default::default()
        };
        let result = engine.register(RegistrationMode::Rigid, &criteria)?;
        assert!(matches!(result.transform, Transform::Rigid(_)));
        assert_eq!(engine.last_transform(), Some(&result.last_transform));

        for (mapped, aligned) in result
            .transform
            .apply(source.points())
            .iter()
            .zip(result.points.iter())
        {
            for (a, b) in mapped.iter().zip(aligned.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
        Ok(())
    }

    fn overflowing_sets() -> (PointSet, PointSet) {
        // finite coordinates whose squared distances exceed f64::MAX
        let reference = vec![
            [1e160, 0.0, 0.0],
            [0.0, 2e160, 0.0],
            [0.0, 0.0, 3e160],
            [1e160, 1e160, 1e160],
        ];
        let source = reference
            .iter()
            .map(|p| [p[0] * 1.5 + 1e159, p[1] * 0.5, p[2]])
            .collect();
        (PointSet::new(reference), PointSet::new(source))
    }

    #[test]
    fn test_overflowing_distances_are_numeric_fault() -> Result<(), IcpError> {
        let (reference, source) = overflowing_sets();

        for mode in [RegistrationMode::Rigid, RegistrationMode::Affine] {
            let mut engine = IcpEngine::new(&reference, &source)?;
            let res = engine.register(mode, &IcpConvergenceCriteria::default());
            assert!(matches!(res, Err(IcpError::NumericFault(_))));
            assert_eq!(engine.state(), RegistrationState::Error);
            assert_eq!(engine.cost(), Err(IcpError::NotRegistered));
            assert!(engine.last_transform().is_none());
        }
        Ok(())
    }

    #[test]
    fn test_overflowing_cost_is_numeric_fault() -> Result<(), IcpError> {
        let points = PointSet::new(create_random_points(10));
        let mut engine = IcpEngine::new(&points, &points)?;
        engine.register(RegistrationMode::Rigid, &IcpConvergenceCriteria::default())?;
        assert_eq!(engine.cost()?, 0.0);

        engine.working = vec![[1e160, -1e160, 1e160]; 10];
        assert!(matches!(engine.cost(), Err(IcpError::NumericFault(_))));
        Ok(())
    }
}
