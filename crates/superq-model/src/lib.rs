#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the superquadric model.
pub mod error;

/// Point cloud container and downsampling.
pub mod pointcloud;

/// The superquadric model and its inside-outside function.
pub mod superquadric;

/// Orientation conversions between Euler ZYZ, axis-angle and rotation matrices.
pub mod transforms;

pub use error::SuperquadricError;
pub use pointcloud::PointCloud;
pub use superquadric::{inside_outside, Superquadric, N_PARAMS};
