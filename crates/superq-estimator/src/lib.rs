#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Bounding boxes, starting point and variable bounds of a fit.
pub mod bounds;

/// Estimator configuration and its JSON loaders.
pub mod config;

/// Orchestration of a fit and extraction of the solution.
pub mod estimator;

/// Objective variants, object classes and the analytic gradient.
pub mod objective;

/// The fit posed as a nonlinear program.
pub mod problem;

pub use bounds::Bounds;
pub use config::{ConfigError, EstimatorConfig};
pub use estimator::{SuperqEstimator, SuperqFit};
pub use objective::{ObjectClass, ObjectiveKind};
pub use problem::{FitStage, SuperqProblem, MIN_FIT_POINTS};
