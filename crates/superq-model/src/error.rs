use thiserror::Error;

/// Errors raised when building or mutating a superquadric.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SuperquadricError {
    /// The input vector does not have the length expected for the quantity.
    #[error("{name} expects {expected} values, got {actual}")]
    InvalidLength {
        /// Name of the quantity being set.
        name: &'static str,
        /// Expected number of values.
        expected: usize,
        /// Number of values provided.
        actual: usize,
    },

    /// A dimension or exponent is zero or negative.
    #[error("{name}[{index}] must be strictly positive, got {value}")]
    NonPositive {
        /// Name of the quantity being set.
        name: &'static str,
        /// Offending component.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// The input contains NaN or infinity.
    #[error("{name} contains a non-finite value")]
    NonFinite {
        /// Name of the quantity being set.
        name: &'static str,
    },

    /// An axis-angle rotation was given with a zero axis.
    #[error("cannot compute a rotation from a zero axis")]
    ZeroAxis,
}
