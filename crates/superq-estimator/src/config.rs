use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};
use superq_model::superquadric::N_PARAMS;
use superq_nlp::SolverOptions;

use crate::bounds::Bounds;

/// An error type for loading an estimator configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// Error to read the file.
    #[error("Failed to read the file. {0}")]
    FileError(#[from] std::io::Error),

    /// Error to parse the configuration.
    #[error("Failed to parse the configuration. {0}")]
    ParseError(#[from] serde_json::Error),

    /// The configuration has an invalid value.
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

/// Configuration of a [`crate::SuperqEstimator`].
///
/// Missing fields take their default value and unknown fields are rejected.
///
/// Example:
///
/// ```
/// use superq_estimator::EstimatorConfig;
///
/// let json = r#"{ "object_class": "box", "solver": { "max_iter": 500 } }"#;
/// let config = EstimatorConfig::from_json_str(json)?;
/// assert_eq!(config.object_class, "box");
/// assert_eq!(config.solver.max_iter, 500);
/// assert!(config.auto_bounds);
/// # Ok::<(), superq_estimator::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    /// Derive the variable bounds from the points.
    #[serde(alias = "autoBounds")]
    pub auto_bounds: bool,
    /// Object class tag: `default`, `box`, `cylinder`, `sphere` or `generic`.
    #[serde(alias = "objectClass")]
    pub object_class: String,
    /// Maximum number of points given to the optimizer, 0 for no limit.
    #[serde(alias = "maxOptimizerPoints")]
    pub max_optimizer_points: usize,
    /// Keep the centroid of the points inside the fitted shape.
    pub constrain_centroid: bool,
    /// Variable bounds used when `auto_bounds` is false.
    pub default_bounds: Bounds,
    /// Solver parameters.
    pub solver: SolverOptions,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        let mut default_bounds = [[0.0; 2]; N_PARAMS];
        for b in &mut default_bounds[0..3] {
            *b = [1e-3, 0.5];
        }
        for b in &mut default_bounds[3..5] {
            *b = [0.1, 2.0];
        }
        for b in &mut default_bounds[5..8] {
            *b = [-2.0, 2.0];
        }
        for b in &mut default_bounds[8..11] {
            *b = [-2.0 * PI, 2.0 * PI];
        }

        Self {
            auto_bounds: true,
            object_class: "default".to_string(),
            max_optimizer_points: 50,
            constrain_centroid: false,
            default_bounds,
            solver: SolverOptions::default(),
        }
    }
}

impl EstimatorConfig {
    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileDoesNotExist(path.to_path_buf()));
        }
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    /// Serialize the configuration as pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the values of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, [lo, hi]) in self.default_bounds.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(ConfigError::InvalidValue(format!(
                    "default_bounds[{i}] = [{lo}, {hi}]"
                )));
            }
        }

        let s = &self.solver;
        let positive = [
            ("solver.tol", s.tol),
            ("solver.acceptable_tol", s.acceptable_tol),
            ("solver.constr_viol_tol", s.constr_viol_tol),
            ("solver.max_cpu_time", s.max_cpu_time),
            ("solver.penalty_init", s.penalty_init),
        ];
        for (name, v) in positive {
            if v.is_nan() || v <= 0.0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be positive, got {v}")));
            }
        }
        if s.penalty_factor.is_nan() || s.penalty_factor <= 1.0 {
            return Err(ConfigError::InvalidValue(format!(
                "solver.penalty_factor must be above 1, got {}",
                s.penalty_factor
            )));
        }
        if s.memory == 0 {
            return Err(ConfigError::InvalidValue("solver.memory must be at least 1".to_string()));
        }
        Ok(())
    }
}
