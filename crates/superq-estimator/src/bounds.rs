use std::f64::consts::PI;

use glam::{DMat3, DVec3};
use superq_model::superquadric::{CENTER, DIMS, EULER, EXPS, N_PARAMS};
use superq_model::transforms::{rotation_matrix_to_euler_zyz, rows_to_dmat3};

use crate::objective::ObjectClass;

/// Lower and upper bound of every decision variable.
pub type Bounds = [[f64; 2]; N_PARAMS];

/// Smallest semi-axis of an estimated superquadric, in metres.
pub const MIN_DIM: f64 = 1e-3;

/// Smallest margin added around the estimated extents, in metres.
pub const MIN_BOUND_MARGIN: f64 = 5e-3;

/// Below this total variance a point cloud has no principal directions.
pub const DEGENERATE_VARIANCE: f64 = 1e-12;

const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// An axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Center of the box.
    pub fn center(&self) -> [f64; 3] {
        std::array::from_fn(|k| 0.5 * (self.min[k] + self.max[k]))
    }

    /// Half of the extent of the box along each axis.
    pub fn half_extents(&self) -> [f64; 3] {
        std::array::from_fn(|k| 0.5 * (self.max[k] - self.min[k]))
    }
}

/// Compute the world aligned bounding box of the points.
///
/// An empty input yields the zero box.
pub fn compute_bounding_box(points: &[[f64; 3]]) -> BoundingBox {
    fold_box(points.iter().map(|p| DVec3::from_array(*p)))
}

/// Compute the bounding box of the points expressed in a local frame.
///
/// # Arguments
///
/// * `points` - The points in world coordinates.
/// * `center` - The origin of the local frame.
/// * `rotation` - Row-major rotation whose columns are the local axes.
///
/// # Returns
///
/// The box of `R^T (p - center)` over all the points.
pub fn compute_bounding_box_in_frame(
    points: &[[f64; 3]],
    center: &[f64; 3],
    rotation: &[[f64; 3]; 3],
) -> BoundingBox {
    let rt = rows_to_dmat3(rotation).transpose();
    let c = DVec3::from_array(*center);
    fold_box(points.iter().map(|p| rt * (DVec3::from_array(*p) - c)))
}

fn fold_box(mut points: impl Iterator<Item = DVec3>) -> BoundingBox {
    let Some(first) = points.next() else {
        return BoundingBox::default();
    };
    let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
    BoundingBox {
        min: min.to_array(),
        max: max.to_array(),
    }
}

/// Compute the centroid of the points, the origin for an empty input.
pub fn compute_centroid(points: &[[f64; 3]]) -> [f64; 3] {
    centroid(points).to_array()
}

fn centroid(points: &[[f64; 3]]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    sum / points.len() as f64
}

/// Estimate the orientation of the point cloud from its principal directions.
///
/// The covariance of the centred points is decomposed with an SVD. The
/// columns of the returned row-major matrix are the principal directions
/// sorted by decreasing variance, with the third one flipped if needed so
/// that the matrix is a proper rotation.
///
/// The identity is returned for fewer than 3 points, a total variance below
/// [`DEGENERATE_VARIANCE`] or a decomposition that is not a rotation.
pub fn compute_initial_orientation(points: &[[f64; 3]]) -> [[f64; 3]; 3] {
    if points.len() < 3 {
        log::debug!("{} points are not enough for an orientation", points.len());
        return IDENTITY;
    }

    let c = centroid(points);
    let mut cov = faer::Mat::<f64>::zeros(3, 3);
    let mut trace = 0.0;
    for i in 0..3 {
        for j in i..3 {
            let v = points
                .iter()
                .map(|p| (p[i] - c[i]) * (p[j] - c[j]))
                .sum::<f64>()
                / points.len() as f64;
            cov.write(i, j, v);
            cov.write(j, i, v);
            if i == j {
                trace += v;
            }
        }
    }

    if !trace.is_finite() || trace < DEGENERATE_VARIANCE {
        log::debug!("degenerate point cloud (variance {trace:e}), using identity orientation");
        return IDENTITY;
    }

    let svd = cov.svd();
    let u = svd.u();
    let mut r: [[f64; 3]; 3] = std::array::from_fn(|i| std::array::from_fn(|j| u.read(i, j)));

    if rows_to_dmat3(&r).determinant() < 0.0 {
        for row in r.iter_mut() {
            row[2] = -row[2];
        }
    }

    if !is_rotation(&rows_to_dmat3(&r)) {
        log::warn!("principal directions are not a rotation, using identity orientation");
        return IDENTITY;
    }

    r
}

fn is_rotation(m: &DMat3) -> bool {
    let err = (m.transpose() * *m - DMat3::IDENTITY)
        .to_cols_array()
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    err.is_finite() && err < 1e-6 && (m.determinant() - 1.0).abs() < 1e-6
}

/// Compute the starting point of the fit.
///
/// The center is the centroid of the points and the orientation their
/// principal directions (see [`compute_initial_orientation`]). The
/// dimensions are the half extents of the points in that frame, at least
/// [`MIN_DIM`], and both exponents start at 1 (an ellipsoid).
pub fn compute_x0(points: &[[f64; 3]]) -> [f64; N_PARAMS] {
    let mut x0 = [0.0; N_PARAMS];
    x0[DIMS].fill(MIN_DIM);
    x0[EXPS].fill(1.0);
    if points.is_empty() {
        return x0;
    }

    let center = centroid(points).to_array();
    let rotation = compute_initial_orientation(points);
    let local = compute_bounding_box_in_frame(points, &center, &rotation);

    for (d, h) in x0[DIMS].iter_mut().zip(local.half_extents()) {
        *d = h.max(MIN_DIM);
    }
    x0[CENTER].copy_from_slice(&center);
    x0[EULER].copy_from_slice(&rotation_matrix_to_euler_zyz(&rotation));

    log::debug!("initial guess: {x0:?}");
    x0
}

/// Compute the bounds of the decision variables.
///
/// # Arguments
///
/// * `points` - The points to fit.
/// * `x0` - The starting point, see [`compute_x0`].
/// * `auto_bounds` - Derive the bounds from the points instead of using `defaults`.
/// * `class` - The object class, which bounds the exponents in automatic mode.
/// * `defaults` - The bounds used when `auto_bounds` is false.
///
/// # Returns
///
/// Bounds with `lower < upper` for every variable.
pub fn compute_bounds(
    points: &[[f64; 3]],
    x0: &[f64; N_PARAMS],
    auto_bounds: bool,
    class: ObjectClass,
    defaults: &Bounds,
) -> Bounds {
    let mut bounds = if auto_bounds {
        let r = x0[DIMS].iter().fold(0.0f64, |acc, v| acc.max(*v));
        let margin = (0.5 * r).max(MIN_BOUND_MARGIN);
        let aabb = compute_bounding_box(points);

        let mut b = [[0.0; 2]; N_PARAMS];
        for i in DIMS {
            b[i] = [MIN_DIM, (2.0 * r).max(MIN_DIM) + margin];
        }
        for (i, e) in EXPS.zip(class.exponent_bounds()) {
            b[i] = e;
        }
        for (k, i) in CENTER.enumerate() {
            b[i] = [aabb.min[k] - margin, aabb.max[k] + margin];
        }
        for i in EULER {
            b[i] = [-2.0 * PI, 2.0 * PI];
        }
        b
    } else {
        *defaults
    };

    for (i, pair) in bounds.iter_mut().enumerate() {
        if pair[0].is_nan() || pair[1].is_nan() || pair[0] >= pair[1] {
            let mid = 0.5 * (pair[0] + pair[1]);
            let mid = if mid.is_finite() { mid } else { 0.0 };
            log::debug!("widening collapsed bounds {pair:?} of variable {i}");
            *pair = [mid - MIN_BOUND_MARGIN, mid + MIN_BOUND_MARGIN];
        }
    }

    bounds
}

/// Clamp every variable of `x` into its bounds.
pub fn clamp_to_bounds(x: &mut [f64; N_PARAMS], bounds: &Bounds) {
    for (v, [lo, hi]) in x.iter_mut().zip(bounds.iter()) {
        *v = v.max(*lo).min(*hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use superq_model::transforms::euler_zyz_to_rotation_matrix;

    fn box_cloud(half: [f64; 3], rotation: &[[f64; 3]; 3], center: [f64; 3]) -> Vec<[f64; 3]> {
        let mut rng = StdRng::seed_from_u64(7);
        let r = rows_to_dmat3(rotation);
        let c = DVec3::from_array(center);
        let mut points = Vec::new();
        // corners make the extents exact
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    let p = DVec3::new(sx * half[0], sy * half[1], sz * half[2]);
                    points.push((r * p + c).to_array());
                }
            }
        }
        for _ in 0..2000 {
            let p = DVec3::new(
                rng.random_range(-half[0]..half[0]),
                rng.random_range(-half[1]..half[1]),
                rng.random_range(-half[2]..half[2]),
            );
            points.push((r * p + c).to_array());
        }
        points
    }

    #[test]
    fn test_bounding_box() {
        let bb = compute_bounding_box(&[[1.0, -2.0, 0.0], [-1.0, 3.0, 0.5], [0.0, 0.0, 0.25]]);
        assert_eq!(bb.min, [-1.0, -2.0, 0.0]);
        assert_eq!(bb.max, [1.0, 3.0, 0.5]);
        assert_eq!(bb.center(), [0.0, 0.5, 0.25]);
        assert_eq!(bb.half_extents(), [1.0, 2.5, 0.25]);
        assert_eq!(compute_bounding_box(&[]), BoundingBox::default());
    }

    #[test]
    fn test_bounding_box_in_frame() {
        // rotation of 90 degrees about z
        let r = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let points = [[1.0, 2.0, 3.0], [1.0, 4.0, 3.0]];
        let bb = compute_bounding_box_in_frame(&points, &[1.0, 3.0, 3.0], &r);
        assert_relative_eq!(bb.min[0], -1.0);
        assert_relative_eq!(bb.max[0], 1.0);
        assert_relative_eq!(bb.min[1], 0.0);
        assert_relative_eq!(bb.max[1], 0.0);
    }

    #[test]
    fn test_initial_orientation_is_rotation() {
        let rotation = euler_zyz_to_rotation_matrix(&[0.4, 0.9, -0.3]);
        let points = box_cloud([0.1, 0.05, 0.02], &rotation, [0.3, -0.1, 0.5]);
        let r = compute_initial_orientation(&points);

        let m = rows_to_dmat3(&r);
        assert!(is_rotation(&m));

        // the principal directions match the box axes up to sign
        let expected = rows_to_dmat3(&rotation);
        for k in 0..3 {
            let dot = m.col(k).dot(expected.col(k)).abs();
            assert_relative_eq!(dot, 1.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_initial_orientation_fallbacks() {
        assert_eq!(compute_initial_orientation(&[]), IDENTITY);
        assert_eq!(compute_initial_orientation(&[[1.0, 2.0, 3.0]; 2]), IDENTITY);
        assert_eq!(compute_initial_orientation(&[[1.0, 2.0, 3.0]; 10]), IDENTITY);
        assert_eq!(
            compute_initial_orientation(&[[f64::NAN, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            IDENTITY
        );
    }

    #[test]
    fn test_x0_of_box() {
        let rotation = euler_zyz_to_rotation_matrix(&[0.4, 0.9, -0.3]);
        let points = box_cloud([0.1, 0.05, 0.02], &rotation, [0.3, -0.1, 0.5]);
        let x0 = compute_x0(&points);

        assert_relative_eq!(x0[0], 0.1, epsilon = 1e-2);
        assert_relative_eq!(x0[1], 0.05, epsilon = 1e-2);
        assert_relative_eq!(x0[2], 0.02, epsilon = 1e-2);
        assert_eq!(&x0[EXPS], &[1.0, 1.0]);
        assert_relative_eq!(x0[5], 0.3, epsilon = 1e-2);
        assert_relative_eq!(x0[6], -0.1, epsilon = 1e-2);
        assert_relative_eq!(x0[7], 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_x0_of_empty_cloud() {
        let x0 = compute_x0(&[]);
        assert_eq!(x0, [MIN_DIM, MIN_DIM, MIN_DIM, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_auto_bounds_contain_x0() {
        let rotation = euler_zyz_to_rotation_matrix(&[1.0, 0.5, 0.2]);
        let points = box_cloud([0.04, 0.03, 0.08], &rotation, [0.0, 0.2, 0.1]);
        let x0 = compute_x0(&points);
        let defaults = [[0.0; 2]; N_PARAMS];
        let bounds = compute_bounds(&points, &x0, true, ObjectClass::Default, &defaults);

        for (i, [lo, hi]) in bounds.iter().enumerate() {
            assert!(lo < hi, "variable {i}: [{lo}, {hi}]");
            assert!(*lo <= x0[i] && x0[i] <= *hi, "variable {i}: {} not in [{lo}, {hi}]", x0[i]);
        }
        assert_eq!(bounds[3], ObjectClass::Default.exponent_bounds()[0]);
        assert_eq!(bounds[8], [-2.0 * PI, 2.0 * PI]);
    }

    #[test]
    fn test_bounds_of_identical_points() {
        let points = vec![[0.5, 0.5, 0.5]; 20];
        let x0 = compute_x0(&points);
        for auto in [true, false] {
            let defaults = [[1.0, 1.0]; N_PARAMS];
            let bounds = compute_bounds(&points, &x0, auto, ObjectClass::Sphere, &defaults);
            for (i, [lo, hi]) in bounds.iter().enumerate() {
                assert!(lo < hi, "variable {i}: [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn test_fixed_bounds_verbatim() {
        let mut defaults = [[-1.0, 1.0]; N_PARAMS];
        defaults[0] = [0.01, 0.2];
        let x0 = compute_x0(&[]);
        let bounds = compute_bounds(&[], &x0, false, ObjectClass::Box, &defaults);
        assert_eq!(bounds, defaults);
    }

    #[test]
    fn test_clamp_to_bounds() {
        let mut x = [5.0; N_PARAMS];
        x[1] = -5.0;
        clamp_to_bounds(&mut x, &[[0.0, 1.0]; N_PARAMS]);
        assert_eq!(x[0], 1.0);
        assert_eq!(x[1], 0.0);
    }
}
