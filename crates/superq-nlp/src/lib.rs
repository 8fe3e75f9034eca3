#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// The nonlinear program interface.
pub mod problem;

/// Solver termination status.
pub mod status;

/// Projected limited-memory BFGS solver with augmented Lagrangian constraints.
pub mod lbfgs;

pub use lbfgs::{LbfgsSolver, SolveSummary, SolverOptions};
pub use problem::{FinalizeInfo, Nlp, NlpError, NlpInfo, BOUND_INF};
pub use status::SolverStatus;
