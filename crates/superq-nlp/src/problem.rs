//! The capability set a nonlinear program exposes to a solver.
//!
//! A problem is
//!
//! ```text
//! min f(x)   s.t.   x_l <= x <= x_u,   g_l <= g(x) <= g_u
//! ```
//!
//! A solver drives it through [`Nlp`]: it queries the sizes, the bounds and
//! the starting point once, evaluates the objective, the gradient, the
//! constraints and their Jacobian repeatedly, and finally hands back its best
//! iterate through [`Nlp::finalize_solution`], exactly once.

use thiserror::Error;

use crate::status::SolverStatus;

/// Bounds with a magnitude at least this large are treated as infinite.
pub const BOUND_INF: f64 = 1e19;

/// Errors a problem can report from one of its callbacks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NlpError {
    /// A buffer or vector does not have the declared size.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Declared size.
        expected: usize,
        /// Size received.
        actual: usize,
    },

    /// An evaluation produced NaN or infinity.
    #[error("non-finite value in {0}")]
    InvalidNumber(&'static str),

    /// The problem was queried in a stage that does not allow it.
    #[error("operation not allowed in the {0} stage")]
    InvalidStage(&'static str),

    /// The problem definition is inconsistent.
    #[error("invalid problem definition: {0}")]
    InvalidDefinition(String),
}

/// Sizes of a nonlinear program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NlpInfo {
    /// Number of decision variables.
    pub n: usize,
    /// Number of constraint rows.
    pub m: usize,
    /// Number of non-zero entries of the constraint Jacobian.
    pub nnz_jac_g: usize,
}

/// What a solver reports back when it terminates.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeInfo<'a> {
    /// Why the solver stopped.
    pub status: SolverStatus,
    /// Best iterate found.
    pub x: &'a [f64],
    /// Constraint values at `x`, empty when unavailable.
    pub g: &'a [f64],
    /// Objective value at `x`, NaN when unavailable.
    pub obj_value: f64,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// A nonlinear program as seen by a solver.
///
/// Evaluation callbacks take the problem by shared reference; only the start
/// and the end of a solve mutate it.
pub trait Nlp {
    /// Sizes of the problem.
    fn info(&self) -> NlpInfo;

    /// Fill the variable bounds `x_l, x_u` (length `n`) and the constraint
    /// bounds `g_l, g_u` (length `m`).
    fn bounds(
        &self,
        x_l: &mut [f64],
        x_u: &mut [f64],
        g_l: &mut [f64],
        g_u: &mut [f64],
    ) -> Result<(), NlpError>;

    /// Fill positive scaling factors of the variables. The solver then works on
    /// `x_i * scaling_i`; returning `false` leaves the variables unscaled.
    fn variable_scaling(&self, _scaling: &mut [f64]) -> Result<bool, NlpError> {
        Ok(false)
    }

    /// Fill the starting point. Called once, before any evaluation.
    fn starting_point(&mut self, x: &mut [f64]) -> Result<(), NlpError>;

    /// Objective value at `x`.
    fn eval_f(&self, x: &[f64]) -> Result<f64, NlpError>;

    /// Objective gradient at `x`.
    fn eval_grad_f(&self, x: &[f64], grad_f: &mut [f64]) -> Result<(), NlpError>;

    /// Constraint values at `x`.
    fn eval_g(&self, _x: &[f64], _g: &mut [f64]) -> Result<(), NlpError> {
        Ok(())
    }

    /// Row and column of every non-zero of the constraint Jacobian.
    ///
    /// The structure is queried once and must not change during a solve.
    fn jacobian_structure(&self, _rows: &mut [usize], _cols: &mut [usize]) -> Result<(), NlpError> {
        Ok(())
    }

    /// Values of the constraint Jacobian, in the order of [`Nlp::jacobian_structure`].
    fn eval_jac_g(&self, _x: &[f64], _values: &mut [f64]) -> Result<(), NlpError> {
        Ok(())
    }

    /// Receive the terminal status and the best iterate.
    fn finalize_solution(&mut self, solution: FinalizeInfo<'_>);
}
