use glam::DVec3;

/// A point cloud holding the full set of points and the working set fed to the optimizer.
///
/// The full set (with its optional colors) is kept untouched for visualization;
/// only the working set is reduced by [`PointCloud::downsample`].
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    // The points used by the optimizer.
    points: Vec<[f64; 3]>,
    // All the points, used for visualization.
    points_for_vis: Vec<[f64; 3]>,
    // The colors of the full set of points.
    colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points and colors (optional).
    ///
    /// The working set starts equal to the full set.
    pub fn new(points: Vec<[f64; 3]>, colors: Option<Vec<[u8; 3]>>) -> Self {
        if let Some(c) = colors.as_ref() {
            if c.len() != points.len() {
                log::warn!(
                    "point cloud has {} points but {} colors",
                    points.len(),
                    c.len()
                );
            }
        }
        Self {
            points: points.clone(),
            points_for_vis: points,
            colors,
        }
    }

    /// Get the number of points in the working set.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the working set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get the number of points in the full set.
    #[inline]
    pub fn len_for_vis(&self) -> usize {
        self.points_for_vis.len()
    }

    /// Get as reference the working set.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the full set.
    pub fn points_for_vis(&self) -> &[[f64; 3]] {
        &self.points_for_vis
    }

    /// Get as reference the colors of the full set.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Replace the working set with at most `max_points` points of the full set.
    ///
    /// See [`downsample_uniform`].
    pub fn downsample(&mut self, max_points: usize) {
        self.points = downsample_uniform(&self.points_for_vis, max_points);
        log::debug!(
            "downsampled point cloud from {} to {} points",
            self.points_for_vis.len(),
            self.points.len()
        );
    }

    /// Get the minimum bound of the working set.
    pub fn min_bound(&self) -> [f64; 3] {
        self.fold_points(DVec3::min)
    }

    /// Get the maximum bound of the working set.
    pub fn max_bound(&self) -> [f64; 3] {
        self.fold_points(DVec3::max)
    }

    /// Get the centroid of the working set, the origin when it is empty.
    pub fn centroid(&self) -> [f64; 3] {
        if self.points.is_empty() {
            return [0.0; 3];
        }
        let sum = self
            .points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
        (sum / self.points.len() as f64).to_array()
    }

    fn fold_points(&self, f: fn(DVec3, DVec3) -> DVec3) -> [f64; 3] {
        match self.points.first() {
            None => [0.0; 3],
            Some(first) => self
                .points
                .iter()
                .map(|p| DVec3::from_array(*p))
                .fold(DVec3::from_array(*first), f)
                .to_array(),
        }
    }
}

/// Select at most `max_points` points spread uniformly over the input order.
///
/// The output holds the points at indices `floor(i * n / max_points)` for
/// `i in 0..max_points`, which are distinct and cover the whole input. If the
/// input has no more than `max_points` points, or `max_points` is zero, the
/// input is copied unchanged.
///
/// Example:
///
/// ```
/// use superq_model::pointcloud::downsample_uniform;
///
/// let points = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect::<Vec<_>>();
/// let selected = downsample_uniform(&points, 5);
/// assert_eq!(selected.len(), 5);
/// assert_eq!(selected[1], [2.0, 0.0, 0.0]);
/// ```
pub fn downsample_uniform(points: &[[f64; 3]], max_points: usize) -> Vec<[f64; 3]> {
    let n = points.len();
    if max_points == 0 || n <= max_points {
        return points.to_vec();
    }
    (0..max_points).map(|i| points[i * n / max_points]).collect()
}
