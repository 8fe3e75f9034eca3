use serde::{Deserialize, Serialize};

/// Reason why a solver terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    /// Converged: optimality and feasibility within `tol`.
    Success,
    /// Stopped early with optimality within `acceptable_tol`.
    SolvedToAcceptableLevel,
    /// Maximum number of iterations reached.
    MaximumIterationsExceeded,
    /// Maximum wall time reached.
    MaximumCpuTimeExceeded,
    /// The line search could not make progress.
    StopAtTinyStep,
    /// Constraints could not be satisfied.
    LocalInfeasibility,
    /// NaN or infinity returned by an evaluation.
    InvalidNumberDetected,
    /// An evaluation callback failed.
    ErrorInStepComputation,
    /// Sizes, bounds or stage of the problem are inconsistent.
    InvalidProblemDefinition,
}

impl SolverStatus {
    /// Whether the returned iterate satisfies the convergence tolerances.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SolvedToAcceptableLevel)
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::SolvedToAcceptableLevel => "solved to acceptable level",
            Self::MaximumIterationsExceeded => "maximum iterations exceeded",
            Self::MaximumCpuTimeExceeded => "maximum cpu time exceeded",
            Self::StopAtTinyStep => "stop at tiny step",
            Self::LocalInfeasibility => "local infeasibility",
            Self::InvalidNumberDetected => "invalid number detected",
            Self::ErrorInStepComputation => "error in step computation",
            Self::InvalidProblemDefinition => "invalid problem definition",
        };
        write!(f, "{s}")
    }
}
