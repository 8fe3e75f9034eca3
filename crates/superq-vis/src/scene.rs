use glam::DVec3;
use serde::{Deserialize, Serialize};
use superq_model::{PointCloud, Superquadric};

use crate::layout::{superquadric_render_params, RENDER_PARAMS_LEN};
use crate::pose::GraspPose;

/// Offset of the camera from the point it looks at.
pub const CAMERA_OFFSET: [f64; 3] = [0.5, 0.0, 0.4];

/// Vertical spacing between consecutive pose captions.
pub const CAPTION_STEP: f64 = 0.01;

/// A camera looking at a point with the z axis up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Position of the camera.
    pub position: [f64; 3],
    /// Point the camera looks at.
    pub focal_point: [f64; 3],
    /// Up direction of the view.
    pub view_up: [f64; 3],
}

impl Camera {
    /// Frame a camera on `target`, placed at [`CAMERA_OFFSET`] from it.
    pub fn looking_at(target: [f64; 3]) -> Self {
        Self {
            position: (DVec3::from_array(target) + DVec3::from_array(CAMERA_OFFSET)).to_array(),
            focal_point: target,
            view_up: [0.0, 0.0, 1.0],
        }
    }
}

/// A set of points drawn with a size and optional per point colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLayer {
    /// The points.
    pub points: Vec<[f64; 3]>,
    /// One color per point, or a single uniform color when `None`.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Uniform color used when `colors` is `None`.
    pub color: [u8; 3],
    /// Point size in pixels.
    pub size: u32,
}

/// A grasp pose placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseMarker {
    /// Row-major homogeneous transform of the pose.
    pub transform: [[f64; 4]; 4],
    /// Caption text.
    pub caption: String,
    /// Point where the caption is attached.
    pub caption_anchor: [f64; 3],
}

/// Everything a renderer needs to draw a fit.
///
/// Adding point clouds or superquadrics frames the camera on them, the
/// superquadrics taking precedence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    /// Point layers, full clouds first.
    pub point_layers: Vec<PointLayer>,
    /// Superquadrics in the render layout.
    pub superquadrics: Vec<[f64; RENDER_PARAMS_LEN]>,
    /// Grasp pose markers.
    pub poses: Vec<PoseMarker>,
    /// Height of a support plane, if any.
    pub plane: Option<f64>,
    /// Camera of the scene.
    pub camera: Option<Camera>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the full set of a point cloud, with its colors, and optionally its
    /// working set highlighted in red.
    ///
    /// The camera is framed on the center of the bounding box of the full set
    /// unless superquadrics were already added.
    pub fn add_points(&mut self, cloud: &PointCloud, show_working_set: bool, size: u32) {
        self.point_layers.push(PointLayer {
            points: cloud.points_for_vis().to_vec(),
            colors: cloud.colors().map(|c| c.to_vec()),
            color: [255, 255, 255],
            size,
        });
        if show_working_set {
            self.point_layers.push(PointLayer {
                points: cloud.points().to_vec(),
                colors: None,
                color: [255, 0, 0],
                size,
            });
        }

        if self.superquadrics.is_empty() {
            if let Some(center) = box_center(cloud.points_for_vis()) {
                self.camera = Some(Camera::looking_at(center));
            }
        }
    }

    /// Add superquadrics and frame the camera on the mean of their centers.
    pub fn add_superquadrics(&mut self, superqs: &[Superquadric]) {
        if superqs.is_empty() {
            return;
        }
        self.superquadrics
            .extend(superqs.iter().map(superquadric_render_params));

        let sum = superqs
            .iter()
            .fold(DVec3::ZERO, |acc, s| acc + DVec3::from_array(s.center()));
        self.camera = Some(Camera::looking_at((sum / superqs.len() as f64).to_array()));
    }

    /// Add grasp poses, skipping the ones that are not renderable.
    ///
    /// Captions are attached above the pose position, each one
    /// [`CAPTION_STEP`] higher than the previous one.
    pub fn add_poses(&mut self, poses: &[GraspPose]) {
        let mut offset = 0.0;
        for pose in poses {
            if !pose.is_renderable() {
                log::debug!("skipping empty {} hand pose", pose.hand);
                continue;
            }
            offset += CAPTION_STEP;
            let [x, y, z] = pose.position();
            self.poses.push(PoseMarker {
                transform: pose.transform(),
                caption: pose.caption(),
                caption_anchor: [x, y, z + offset],
            });
        }
    }

    /// Add a horizontal support plane at height `z`.
    pub fn add_plane(&mut self, z: f64) {
        self.plane = Some(z);
    }
}

fn box_center(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    let first = DVec3::from_array(*points.first()?);
    let (min, max) = points
        .iter()
        .map(|p| DVec3::from_array(*p))
        .fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
    Some((0.5 * (min + max)).to_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use superq_model::SuperquadricError;

    fn superq_at(center: [f64; 3]) -> Result<Superquadric, SuperquadricError> {
        let params = [0.05, 0.04, 0.03, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut s = Superquadric::from_params(&params)?;
        s.set_center(&center)?;
        Ok(s)
    }

    #[test]
    fn test_camera_on_points() {
        let mut cloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 2.0, 0.5], [0.2, 0.2, 0.2]],
            Some(vec![[1, 2, 3]; 3]),
        );
        cloud.downsample(2);

        let mut scene = Scene::new();
        scene.add_points(&cloud, true, 4);

        assert_eq!(scene.point_layers.len(), 2);
        assert_eq!(scene.point_layers[0].points.len(), 3);
        assert_eq!(scene.point_layers[1].points.len(), 2);
        assert_eq!(scene.point_layers[1].color, [255, 0, 0]);

        let camera = scene.camera.unwrap();
        assert_eq!(camera.focal_point, [0.5, 1.0, 0.25]);
        assert_relative_eq!(camera.position[0], 1.0);
        assert_relative_eq!(camera.position[1], 1.0);
        assert_relative_eq!(camera.position[2], 0.65);
        assert_eq!(camera.view_up, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_camera_on_superquadrics() -> Result<(), Box<dyn std::error::Error>> {
        let mut scene = Scene::new();
        scene.add_superquadrics(&[superq_at([0.0, 0.0, 0.0])?, superq_at([1.0, 0.0, 0.2])?]);
        // points added afterwards do not move the camera
        scene.add_points(&PointCloud::new(vec![[5.0, 5.0, 5.0]], None), false, 2);

        let camera = scene.camera.ok_or("no camera")?;
        assert_relative_eq!(camera.focal_point[0], 0.5);
        assert_relative_eq!(camera.focal_point[2], 0.1);
        assert_relative_eq!(camera.position[0], 1.0);
        assert_relative_eq!(camera.position[2], 0.5);
        assert_eq!(scene.superquadrics.len(), 2);
        assert_eq!(&scene.superquadrics[1][0..3], &[1.0, 0.0, 0.2]);
        Ok(())
    }

    #[test]
    fn test_pose_markers() {
        let poses = [
            GraspPose::new([0.1, 0.0, 0.2, 0.0, 0.0, 0.0], 0.5, "right"),
            GraspPose::new([0.0; 6], 0.1, "left"),
            GraspPose::new([0.2, 0.0, 0.2, 0.0, 1.0, 0.0], 0.25, "left"),
        ];
        let mut scene = Scene::new();
        scene.add_poses(&poses);

        assert_eq!(scene.poses.len(), 2);
        assert_eq!(scene.poses[0].caption, "right : 0.5");
        assert_relative_eq!(scene.poses[0].caption_anchor[2], 0.21);
        assert_relative_eq!(scene.poses[1].caption_anchor[2], 0.22);
        assert_eq!(scene.poses[1].caption, "left : 0.25");
    }

    #[test]
    fn test_serialize_scene() -> Result<(), Box<dyn std::error::Error>> {
        let mut scene = Scene::new();
        scene.add_superquadrics(&[superq_at([0.0, 0.1, 0.2])?]);
        scene.add_plane(0.0);
        let json = serde_json::to_string(&scene)?;
        let back: Scene = serde_json::from_str(&json)?;
        assert_eq!(back, scene);
        Ok(())
    }
}
