use superq_model::superquadric::N_PARAMS;
use superq_model::{PointCloud, Superquadric};
use superq_nlp::{LbfgsSolver, SolverStatus};

use crate::bounds::Bounds;
use crate::config::{ConfigError, EstimatorConfig};
use crate::objective::ObjectClass;
use crate::problem::{SuperqProblem, MIN_FIT_POINTS};

/// Result of fitting a superquadric to a point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperqFit {
    /// The fitted superquadric; the all-zero value when no fit was attempted.
    pub superquadric: Superquadric,
    /// Termination status of the solver.
    pub status: SolverStatus,
    /// Final objective value, NaN when no fit was attempted.
    pub cost: f64,
    /// Number of solver iterations.
    pub iterations: usize,
    /// The starting point of the fit.
    pub x0: [f64; N_PARAMS],
    /// The variable bounds of the fit.
    pub bounds: Bounds,
}

impl SuperqFit {
    /// Whether the solver converged.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Fits superquadrics to point clouds.
///
/// Every fit builds its own [`SuperqProblem`], so one estimator can be
/// shared between threads.
///
/// Example:
///
/// ```
/// use superq_estimator::{EstimatorConfig, SuperqEstimator};
/// use superq_model::{PointCloud, Superquadric};
///
/// let params = [0.05, 0.05, 0.05, 1.0, 1.0, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0];
/// let sphere = Superquadric::from_params(&params)?;
/// let cloud = PointCloud::new(sphere.sample_surface(10, 20), None);
///
/// let estimator = SuperqEstimator::new(EstimatorConfig::default())?;
/// let fit = estimator.fit(&cloud);
/// assert!(fit.superquadric.is_valid());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SuperqEstimator {
    config: EstimatorConfig,
    class: ObjectClass,
    solver: LbfgsSolver,
}

impl SuperqEstimator {
    /// Create an estimator from a configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: EstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            class: ObjectClass::from_tag(&config.object_class),
            solver: LbfgsSolver::new(config.solver.clone()),
            config,
        })
    }

    /// The configuration of the estimator.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// The object class parsed from the configuration.
    pub fn object_class(&self) -> ObjectClass {
        self.class
    }

    /// Fit a superquadric to the working set of `cloud`.
    ///
    /// The working set is downsampled to `max_optimizer_points`. Clouds with
    /// fewer than [`MIN_FIT_POINTS`] points are not fitted: the result has
    /// the status [`SolverStatus::InvalidProblemDefinition`] and an all-zero
    /// superquadric.
    pub fn fit(&self, cloud: &PointCloud) -> SuperqFit {
        let mut problem = SuperqProblem::new();
        let configured = problem
            .set_points(cloud, self.config.max_optimizer_points)
            .and_then(|_| {
                problem.configure(
                    self.config.auto_bounds,
                    self.class,
                    &self.config.default_bounds,
                    self.config.constrain_centroid,
                )
            });

        if let Err(e) = configured {
            log::warn!("cannot fit a superquadric: {e}");
            return SuperqFit {
                superquadric: Superquadric::new(),
                status: SolverStatus::InvalidProblemDefinition,
                cost: f64::NAN,
                iterations: 0,
                x0: [0.0; N_PARAMS],
                bounds: self.config.default_bounds,
            };
        }

        let summary = self.solver.solve(&mut problem);
        let superquadric = problem.result();

        log::info!(
            "fitted {} superquadric to {} points: {} after {} iterations, cost {:.3e}",
            self.class,
            problem.points().len(),
            summary.status,
            summary.iterations,
            summary.obj_value
        );

        SuperqFit {
            superquadric,
            status: summary.status,
            cost: summary.obj_value,
            iterations: summary.iterations,
            x0: *problem.x0(),
            bounds: *problem.variable_bounds(),
        }
    }

    /// Fit a superquadric to each point cloud independently.
    pub fn fit_many(&self, clouds: &[PointCloud]) -> Vec<SuperqFit> {
        clouds.iter().map(|cloud| self.fit(cloud)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SuperqEstimator>();
    }

    #[test]
    fn test_invalid_config() {
        let mut config = EstimatorConfig::default();
        config.solver.memory = 0;
        assert!(SuperqEstimator::new(config).is_err());
    }

    #[test]
    fn test_unknown_class() -> Result<(), ConfigError> {
        let config = EstimatorConfig {
            object_class: "mug".to_string(),
            ..Default::default()
        };
        let estimator = SuperqEstimator::new(config)?;
        assert_eq!(estimator.object_class(), ObjectClass::Default);
        Ok(())
    }

    #[test]
    fn test_too_few_points() -> Result<(), ConfigError> {
        let estimator = SuperqEstimator::new(EstimatorConfig::default())?;
        for n in 0..MIN_FIT_POINTS {
            let fit = estimator.fit(&PointCloud::new(vec![[0.1, 0.2, 0.3]; n], None));
            assert_eq!(fit.status, SolverStatus::InvalidProblemDefinition);
            assert!(!fit.is_success());
            assert_eq!(fit.superquadric, Superquadric::new());
            assert!(fit.superquadric.params().iter().all(|v| v.is_finite()));
        }
        Ok(())
    }

    #[test]
    fn test_fit_many_keeps_order() -> Result<(), ConfigError> {
        let estimator = SuperqEstimator::new(EstimatorConfig::default())?;
        let clouds = [0.1, 0.5].map(|z| {
            let params = [0.04, 0.04, 0.04, 1.0, 1.0, 0.0, 0.0, z, 0.0, 0.0, 0.0];
            let superq = Superquadric::from_params(&params).unwrap_or_default();
            PointCloud::new(superq.sample_surface(8, 12), None)
        });
        let fits = estimator.fit_many(&clouds);
        assert_eq!(fits.len(), 2);
        assert!((fits[0].superquadric.center()[2] - 0.1).abs() < 0.02);
        assert!((fits[1].superquadric.center()[2] - 0.5).abs() < 0.02);
        Ok(())
    }
}
