use superq_model::Superquadric;

/// Number of values of the render layout of a superquadric.
pub const RENDER_PARAMS_LEN: usize = 12;

/// Flatten a superquadric into the layout consumed by renderers.
///
/// The layout is `[cx, cy, cz, ax, ay, az, angle, a1, a2, a3, e1, e2]`: the
/// center, the orientation as unit axis and angle, the dimensions and the
/// exponents.
///
/// Example:
///
/// ```
/// use superq_model::Superquadric;
/// use superq_vis::superquadric_render_params;
///
/// let params = [0.1, 0.2, 0.3, 0.5, 1.0, 1.0, 2.0, 3.0, 0.0, 0.0, 0.0];
/// let superq = Superquadric::from_params(&params)?;
/// let r = superquadric_render_params(&superq);
/// assert_eq!(&r[0..3], &[1.0, 2.0, 3.0]);
/// assert_eq!(&r[3..7], &[1.0, 0.0, 0.0, 0.0]);
/// assert_eq!(&r[7..12], &[0.1, 0.2, 0.3, 0.5, 1.0]);
/// # Ok::<(), superq_model::SuperquadricError>(())
/// ```
pub fn superquadric_render_params(superq: &Superquadric) -> [f64; RENDER_PARAMS_LEN] {
    let mut r = [0.0; RENDER_PARAMS_LEN];
    r[0..3].copy_from_slice(&superq.center());
    r[3..7].copy_from_slice(&superq.axis_angle());
    r[7..10].copy_from_slice(&superq.dims());
    r[10..12].copy_from_slice(&superq.exps());
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use superq_model::transforms::axis_angle_to_rotation_matrix;

    #[test]
    fn test_layout_orientation() -> Result<(), Box<dyn std::error::Error>> {
        let params = [0.1, 0.2, 0.3, 0.5, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut superq = Superquadric::from_params(&params)?;
        superq.set_axis_angle(&[0.0, 0.0, 2.0, 0.7])?;

        let r = superquadric_render_params(&superq);
        let expected = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], 0.7)?;
        let actual = axis_angle_to_rotation_matrix(&[r[3], r[4], r[5]], r[6])?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(actual[i][j], expected[i][j], epsilon = 1e-9);
            }
        }
        Ok(())
    }
}
