use std::f64::consts::{FRAC_PI_2, PI};
use std::ops::Range;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::SuperquadricError;
use crate::transforms::{
    axis_angle_to_rotation_matrix, euler_zyz_to_dmat3, euler_zyz_to_rotation_matrix,
    rotation_matrix_to_axis_angle, rotation_matrix_to_euler_zyz,
};

/// Number of parameters of a superquadric.
pub const N_PARAMS: usize = 11;

/// Slice of the parameter vector holding the dimensions `a1, a2, a3`.
pub const DIMS: Range<usize> = 0..3;
/// Slice of the parameter vector holding the exponents `e1, e2`.
pub const EXPS: Range<usize> = 3..5;
/// Slice of the parameter vector holding the center `x, y, z`.
pub const CENTER: Range<usize> = 5..8;
/// Slice of the parameter vector holding the Euler ZYZ angles `phi, theta, psi`.
pub const EULER: Range<usize> = 8..11;

/// Smallest dimension used when evaluating the inside-outside function.
pub const MIN_DIM_EPS: f64 = 1e-9;
/// Smallest exponent used when evaluating the inside-outside function.
pub const MIN_EXP_EPS: f64 = 1e-3;

/// A superquadric with 11 parameters.
///
/// The parameter vector is the only state. It is laid out as
/// `[a1, a2, a3, e1, e2, x, y, z, phi, theta, psi]`: the semi-axes, the two
/// shape exponents, the center and the orientation as Euler ZYZ angles.
/// Every other view (axis-angle, rotation matrix, ...) is computed from it.
///
/// [`Superquadric::new`] yields the all-zero value used before a shape is
/// known; such a value is not [`valid`](Superquadric::is_valid).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Superquadric {
    params: [f64; N_PARAMS],
}

impl Superquadric {
    /// Create an all-zero superquadric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a superquadric from its 11 parameters.
    pub fn from_params(p: &[f64]) -> Result<Self, SuperquadricError> {
        let mut superq = Self::new();
        superq.set_params(p)?;
        Ok(superq)
    }

    /// Set all the parameters.
    ///
    /// # Errors
    ///
    /// Fails if `p` does not contain 11 finite values or if any dimension or
    /// exponent is not strictly positive. The superquadric is left unchanged.
    pub fn set_params(&mut self, p: &[f64]) -> Result<(), SuperquadricError> {
        check_len("params", p, N_PARAMS)?;
        check_finite("params", p)?;
        check_positive("dims", &p[DIMS])?;
        check_positive("exps", &p[EXPS])?;
        self.params.copy_from_slice(p);
        Ok(())
    }

    /// Set the dimensions `a1, a2, a3`.
    pub fn set_dims(&mut self, d: &[f64]) -> Result<(), SuperquadricError> {
        check_len("dims", d, 3)?;
        check_finite("dims", d)?;
        check_positive("dims", d)?;
        self.params[DIMS].copy_from_slice(d);
        Ok(())
    }

    /// Set the exponents `e1, e2`.
    pub fn set_exps(&mut self, e: &[f64]) -> Result<(), SuperquadricError> {
        check_len("exps", e, 2)?;
        check_finite("exps", e)?;
        check_positive("exps", e)?;
        self.params[EXPS].copy_from_slice(e);
        Ok(())
    }

    /// Set the center.
    pub fn set_center(&mut self, c: &[f64]) -> Result<(), SuperquadricError> {
        check_len("center", c, 3)?;
        check_finite("center", c)?;
        self.params[CENTER].copy_from_slice(c);
        Ok(())
    }

    /// Set the orientation from `[ax, ay, az, angle]`.
    ///
    /// The axis is normalized; a zero axis is rejected.
    pub fn set_axis_angle(&mut self, o: &[f64]) -> Result<(), SuperquadricError> {
        check_len("axis-angle", o, 4)?;
        check_finite("axis-angle", o)?;
        let r = axis_angle_to_rotation_matrix(&[o[0], o[1], o[2]], o[3])?;
        self.params[EULER].copy_from_slice(&rotation_matrix_to_euler_zyz(&r));
        Ok(())
    }

    /// Set the orientation from the Euler ZYZ angles `[phi, theta, psi]`.
    pub fn set_euler_zyz(&mut self, a: &[f64]) -> Result<(), SuperquadricError> {
        check_len("euler-zyz", a, 3)?;
        check_finite("euler-zyz", a)?;
        self.params[EULER].copy_from_slice(a);
        Ok(())
    }

    /// The 11 parameters.
    pub fn params(&self) -> [f64; N_PARAMS] {
        self.params
    }

    /// The dimensions `a1, a2, a3`.
    pub fn dims(&self) -> [f64; 3] {
        [self.params[0], self.params[1], self.params[2]]
    }

    /// The exponents `e1, e2`.
    pub fn exps(&self) -> [f64; 2] {
        [self.params[3], self.params[4]]
    }

    /// The center.
    pub fn center(&self) -> [f64; 3] {
        [self.params[5], self.params[6], self.params[7]]
    }

    /// The Euler ZYZ angles `phi, theta, psi`.
    pub fn euler_zyz(&self) -> [f64; 3] {
        [self.params[8], self.params[9], self.params[10]]
    }

    /// The orientation as `[ax, ay, az, angle]` with a unit axis.
    pub fn axis_angle(&self) -> [f64; 4] {
        rotation_matrix_to_axis_angle(&self.axes())
    }

    /// The row-major rotation matrix whose columns are the local axes.
    pub fn axes(&self) -> [[f64; 3]; 3] {
        euler_zyz_to_rotation_matrix(&self.euler_zyz())
    }

    /// The pose as center followed by the Euler ZYZ angles.
    pub fn pose(&self) -> [f64; 6] {
        let c = self.center();
        let ea = self.euler_zyz();
        [c[0], c[1], c[2], ea[0], ea[1], ea[2]]
    }

    /// Whether dimensions and exponents are strictly positive and all values finite.
    pub fn is_valid(&self) -> bool {
        self.params.iter().all(|v| v.is_finite())
            && self.params[DIMS].iter().all(|&v| v > 0.0)
            && self.params[EXPS].iter().all(|&v| v > 0.0)
    }

    /// Evaluate the inside-outside function for the shape placed at `pose`.
    ///
    /// # Arguments
    ///
    /// * `pose` - Center followed by the Euler ZYZ angles.
    /// * `point` - The point in the world frame.
    ///
    /// # Returns
    ///
    /// 1 on the surface, less than 1 inside and greater than 1 outside.
    pub fn inside_outside_f(&self, pose: &[f64; 6], point: &[f64; 3]) -> f64 {
        let mut params = self.params;
        params[CENTER].copy_from_slice(&pose[..3]);
        params[EULER].copy_from_slice(&pose[3..]);
        inside_outside(&params, point)
    }

    /// Evaluate the inside-outside function at the current pose.
    pub fn inside_outside(&self, point: &[f64; 3]) -> f64 {
        inside_outside(&self.params, point)
    }

    /// Sample points on the surface on a regular latitude/longitude grid.
    ///
    /// # Arguments
    ///
    /// * `n_lat` - Number of samples of the latitude, poles included.
    /// * `n_lon` - Number of samples of the longitude.
    pub fn sample_surface(&self, n_lat: usize, n_lon: usize) -> Vec<[f64; 3]> {
        let [a1, a2, a3] = self.dims();
        let [e1, e2] = self.exps();
        let r = euler_zyz_to_dmat3(&self.euler_zyz());
        let c = DVec3::from_array(self.center());

        let mut points = Vec::with_capacity(n_lat * n_lon);
        for i in 0..n_lat {
            let eta = if n_lat > 1 {
                -FRAC_PI_2 + PI * i as f64 / (n_lat - 1) as f64
            } else {
                0.0
            };
            for j in 0..n_lon {
                let omega = -PI + 2.0 * PI * j as f64 / n_lon as f64;
                let local = DVec3::new(
                    a1 * spow(eta.cos(), e1) * spow(omega.cos(), e2),
                    a2 * spow(eta.cos(), e1) * spow(omega.sin(), e2),
                    a3 * spow(eta.sin(), e1),
                );
                points.push((r * local + c).to_array());
            }
        }
        points
    }
}

/// Signed power `sign(v) * |v|^e`.
#[inline]
pub fn spow(v: f64, e: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v.signum() * v.abs().powf(e)
    }
}

/// Map a world point into the local frame of a pose given as center and Euler ZYZ.
pub fn world_to_local(pose: &[f64; 6], point: &[f64; 3]) -> [f64; 3] {
    let r = euler_zyz_to_dmat3(&[pose[3], pose[4], pose[5]]);
    let d = DVec3::from_array(*point) - DVec3::new(pose[0], pose[1], pose[2]);
    (r.transpose() * d).to_array()
}

/// Inside-outside function of the superquadric `params` at `point`.
///
/// `F = (|x/a1|^(2/e2) + |y/a2|^(2/e2))^(e2/e1) + |z/a3|^(2/e1)` where
/// `(x, y, z)` is the point in the local frame. Dimensions and exponents are
/// clamped to [`MIN_DIM_EPS`] and [`MIN_EXP_EPS`] so the value stays real.
pub fn inside_outside(params: &[f64; N_PARAMS], point: &[f64; 3]) -> f64 {
    let pose = [
        params[5], params[6], params[7], params[8], params[9], params[10],
    ];
    let [x, y, z] = world_to_local(&pose, point);

    let a1 = params[0].max(MIN_DIM_EPS);
    let a2 = params[1].max(MIN_DIM_EPS);
    let a3 = params[2].max(MIN_DIM_EPS);
    let e1 = params[3].max(MIN_EXP_EPS);
    let e2 = params[4].max(MIN_EXP_EPS);

    let xy = (x / a1).abs().powf(2.0 / e2) + (y / a2).abs().powf(2.0 / e2);
    xy.powf(e2 / e1) + (z / a3).abs().powf(2.0 / e1)
}

fn check_len(name: &'static str, v: &[f64], expected: usize) -> Result<(), SuperquadricError> {
    if v.len() != expected {
        return Err(SuperquadricError::InvalidLength {
            name,
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

fn check_finite(name: &'static str, v: &[f64]) -> Result<(), SuperquadricError> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(SuperquadricError::NonFinite { name });
    }
    Ok(())
}

fn check_positive(name: &'static str, v: &[f64]) -> Result<(), SuperquadricError> {
    match v.iter().position(|&x| x <= 0.0) {
        Some(index) => Err(SuperquadricError::NonPositive {
            name,
            index,
            value: v[index],
        }),
        None => Ok(()),
    }
}
