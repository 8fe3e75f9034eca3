use glam::{DMat3, DQuat, DVec3};

use crate::error::SuperquadricError;

/// Below this value of `sin(theta)` the ZYZ decomposition is treated as gimbal locked.
const GIMBAL_EPS: f64 = 1e-10;

/// Convert a row-major 3x3 array into a glam matrix.
#[inline]
pub fn rows_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(m).transpose()
}

/// Convert a glam matrix into a row-major 3x3 array.
#[inline]
pub fn dmat3_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Rotation matrix of the proper Euler angles ZYZ.
///
/// # Arguments
///
/// * `ea` - The angles `[phi, theta, psi]` in radians.
///
/// # Returns
///
/// The matrix `Rz(phi) * Ry(theta) * Rz(psi)`.
pub fn euler_zyz_to_dmat3(ea: &[f64; 3]) -> DMat3 {
    DMat3::from_rotation_z(ea[0]) * DMat3::from_rotation_y(ea[1]) * DMat3::from_rotation_z(ea[2])
}

/// Row-major rotation matrix of the proper Euler angles ZYZ.
///
/// Example:
///
/// ```
/// use superq_model::transforms::euler_zyz_to_rotation_matrix;
///
/// let r = euler_zyz_to_rotation_matrix(&[0.0, 0.0, 0.0]);
/// assert_eq!(r, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
/// ```
pub fn euler_zyz_to_rotation_matrix(ea: &[f64; 3]) -> [[f64; 3]; 3] {
    dmat3_to_rows(&euler_zyz_to_dmat3(ea))
}

/// Decompose a rotation matrix into proper Euler angles ZYZ.
///
/// The returned angles satisfy `phi, psi` in `(-pi, pi]` and `theta` in `[0, pi]`.
/// When `theta` is 0 or pi only the sum (or difference) of `phi` and `psi` is
/// observable, in which case `psi` is set to zero.
///
/// PRECONDITION: `r` is a rotation matrix.
pub fn rotation_matrix_to_euler_zyz(r: &[[f64; 3]; 3]) -> [f64; 3] {
    let sin_theta = (r[0][2] * r[0][2] + r[1][2] * r[1][2]).sqrt();
    let theta = sin_theta.atan2(r[2][2]);

    if sin_theta > GIMBAL_EPS {
        let phi = r[1][2].atan2(r[0][2]);
        let psi = r[2][1].atan2(-r[2][0]);
        [phi, theta, psi]
    } else if r[2][2] > 0.0 {
        [r[1][0].atan2(r[0][0]), 0.0, 0.0]
    } else {
        [(-r[1][0]).atan2(r[1][1]), std::f64::consts::PI, 0.0]
    }
}

/// Compute the rotation matrix from an axis and angle.
///
/// The axis does not need to be normalized.
///
/// # Errors
///
/// Returns [`SuperquadricError::ZeroAxis`] if the axis has (numerically) zero length.
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], SuperquadricError> {
    let axis = DVec3::from_array(*axis);
    let norm = axis.length();
    if norm < 1e-10 || !norm.is_finite() {
        return Err(SuperquadricError::ZeroAxis);
    }
    Ok(dmat3_to_rows(&DMat3::from_axis_angle(axis / norm, angle)))
}

/// Convert a rotation matrix to `[ax, ay, az, angle]`.
///
/// The axis is a unit vector and the angle lies in `[0, pi]`. The identity
/// maps to the x axis with a zero angle.
pub fn rotation_matrix_to_axis_angle(r: &[[f64; 3]; 3]) -> [f64; 4] {
    let mut q = DQuat::from_mat3(&rows_to_dmat3(r)).normalize();
    if q.w < 0.0 {
        q = -q;
    }
    let (axis, angle) = q.to_axis_angle();
    [axis.x, axis.y, axis.z, angle]
}

/// Partial derivatives of the ZYZ rotation with respect to `phi`, `theta` and `psi`.
pub fn euler_zyz_derivatives(ea: &[f64; 3]) -> [DMat3; 3] {
    let rz_phi = DMat3::from_rotation_z(ea[0]);
    let ry_theta = DMat3::from_rotation_y(ea[1]);
    let rz_psi = DMat3::from_rotation_z(ea[2]);

    [
        d_rotation_z(ea[0]) * ry_theta * rz_psi,
        rz_phi * d_rotation_y(ea[1]) * rz_psi,
        rz_phi * ry_theta * d_rotation_z(ea[2]),
    ]
}

fn d_rotation_z(angle: f64) -> DMat3 {
    let (s, c) = angle.sin_cos();
    DMat3::from_cols(
        DVec3::new(-s, c, 0.0),
        DVec3::new(-c, -s, 0.0),
        DVec3::ZERO,
    )
}

fn d_rotation_y(angle: f64) -> DMat3 {
    let (s, c) = angle.sin_cos();
    DMat3::from_cols(
        DVec3::new(-s, 0.0, -c),
        DVec3::ZERO,
        DVec3::new(c, 0.0, -s),
    )
}
