#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Flat parameter layout of a superquadric consumed by renderers.
pub mod layout;

/// Grasp pose markers.
pub mod pose;

/// Scene description: point layers, superquadrics, poses and camera.
pub mod scene;

pub use layout::{superquadric_render_params, RENDER_PARAMS_LEN};
pub use pose::GraspPose;
pub use scene::{Camera, PointLayer, PoseMarker, Scene};
