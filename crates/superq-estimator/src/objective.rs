//! Objective of the superquadric fit and its analytic gradient.
//!
//! For a decision vector `x` and a point `p`, the normalized residual is
//! `G(x, p) = F(x, p)^e1` where `F` is the inside-outside function, so that
//! `G - 1` grows roughly linearly with the radial distance to the surface.
//! The objective averages `(w (G - 1))^2` over the points, with `w = 1` or
//! `w = sqrt(a1 a2 a3)`.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use superq_model::superquadric::{MIN_DIM_EPS, MIN_EXP_EPS, N_PARAMS};
use superq_model::transforms::{euler_zyz_derivatives, euler_zyz_to_dmat3};

/// The penalty averaged over the points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// `(G - 1)^2`.
    SumOfSquares,
    /// `(sqrt(a1 a2 a3) (G - 1))^2`, which favours the smallest enclosing shape.
    VolumeNormalized,
}

/// Prior on the shape of the object, selecting the objective and the exponent range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    /// Any convex shape between a box and an ellipsoid.
    #[default]
    Default,
    /// Box-like objects.
    Box,
    /// Cylinder-like objects, round around the local z axis.
    Cylinder,
    /// Sphere-like objects.
    Sphere,
    /// Any shape, including concave (star-like) ones.
    Generic,
}

impl ObjectClass {
    /// Parse an object class tag, falling back to [`ObjectClass::Default`] with a warning.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "default" => Self::Default,
            "box" => Self::Box,
            "cylinder" => Self::Cylinder,
            "sphere" => Self::Sphere,
            "generic" => Self::Generic,
            other => {
                log::warn!("unknown object class '{other}', using 'default'");
                Self::Default
            }
        }
    }

    /// The tag of the class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Box => "box",
            Self::Cylinder => "cylinder",
            Self::Sphere => "sphere",
            Self::Generic => "generic",
        }
    }

    /// The objective used for this class.
    pub fn objective(&self) -> ObjectiveKind {
        match self {
            Self::Generic => ObjectiveKind::SumOfSquares,
            _ => ObjectiveKind::VolumeNormalized,
        }
    }

    /// Bounds of `e1` and `e2` when the bounds are computed automatically.
    pub fn exponent_bounds(&self) -> [[f64; 2]; 2] {
        match self {
            Self::Default => [[0.1, 1.0], [0.1, 1.0]],
            Self::Box => [[0.1, 0.3], [0.1, 0.3]],
            Self::Cylinder => [[0.1, 0.3], [0.9, 1.1]],
            Self::Sphere => [[0.9, 1.1], [0.9, 1.1]],
            Self::Generic => [[0.1, 2.0], [0.1, 2.0]],
        }
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quantities of a decision vector shared by every point.
#[derive(Debug, Clone, Copy)]
pub struct ShapeFrame {
    dims: [f64; 3],
    e1: f64,
    e2: f64,
    center: DVec3,
    rotation: DMat3,
    d_rotation: [DMat3; 3],
}

impl ShapeFrame {
    /// Precompute the frame of the decision vector `x`.
    pub fn new(x: &[f64; N_PARAMS]) -> Self {
        let angles = [x[8], x[9], x[10]];
        Self {
            dims: [
                x[0].max(MIN_DIM_EPS),
                x[1].max(MIN_DIM_EPS),
                x[2].max(MIN_DIM_EPS),
            ],
            e1: x[3].max(MIN_EXP_EPS),
            e2: x[4].max(MIN_EXP_EPS),
            center: DVec3::new(x[5], x[6], x[7]),
            rotation: euler_zyz_to_dmat3(&angles),
            d_rotation: euler_zyz_derivatives(&angles),
        }
    }

    /// `sqrt(a1 a2 a3)`.
    pub fn volume_weight(&self) -> f64 {
        (self.dims[0] * self.dims[1] * self.dims[2]).sqrt()
    }

    /// Normalized residual `G = F^e1` at `point`.
    pub fn residual(&self, point: &[f64; 3]) -> f64 {
        let l = self.rotation.transpose() * (DVec3::from_array(*point) - self.center);
        let [a1, a2, a3] = self.dims;
        let s = (l.x / a1).abs().powf(2.0 / self.e2) + (l.y / a2).abs().powf(2.0 / self.e2);
        let f = s.powf(self.e2 / self.e1) + (l.z / a3).abs().powf(2.0 / self.e1);
        f.powf(self.e1)
    }

    /// Normalized residual `G` at `point` and its gradient with respect to the decision vector.
    pub fn residual_gradient(&self, point: &[f64; 3], grad: &mut [f64; N_PARAMS]) -> f64 {
        grad.fill(0.0);

        let d = DVec3::from_array(*point) - self.center;
        let l = self.rotation.transpose() * d;
        let [a1, a2, a3] = self.dims;
        let (e1, e2) = (self.e1, self.e2);

        let (bx, by, bz) = ((l.x / a1).abs(), (l.y / a2).abs(), (l.z / a3).abs());
        let u = bx.powf(2.0 / e2);
        let v = by.powf(2.0 / e2);
        let w = bz.powf(2.0 / e1);
        let s = u + v;
        let t = s.powf(e2 / e1);
        let f = t + w;
        let g = f.powf(e1);

        // G is flat at the center of the shape
        if f <= 0.0 || !f.is_finite() {
            return g;
        }

        // gradient of F with respect to the local point
        let mut dl = DVec3::ZERO;
        // t / s = s^(e2/e1 - 1), only used where s > 0
        let t_over_s = if s > 0.0 { t / s } else { 0.0 };
        if l.x != 0.0 {
            dl.x = 2.0 / e1 * t_over_s * u / l.x;
        }
        if l.y != 0.0 {
            dl.y = 2.0 / e1 * t_over_s * v / l.y;
        }
        if l.z != 0.0 {
            dl.z = 2.0 / e1 * w / l.z;
        }

        let mut df = [0.0; N_PARAMS];
        df[0] = -2.0 / e1 * t_over_s * u / a1;
        df[1] = -2.0 / e1 * t_over_s * v / a2;
        df[2] = -2.0 / e1 * w / a3;

        let ln_s = if s > 0.0 { s.ln() } else { 0.0 };
        let ln_bz = if bz > 0.0 { bz.ln() } else { 0.0 };
        df[3] = -t * ln_s * e2 / (e1 * e1) - w * ln_bz * 2.0 / (e1 * e1);

        let u_ln = if bx > 0.0 { u * bx.ln() } else { 0.0 };
        let v_ln = if by > 0.0 { v * by.ln() } else { 0.0 };
        let ds_de2 = -2.0 / (e2 * e2) * (u_ln + v_ln);
        df[4] = t * ln_s / e1 + e2 / e1 * t_over_s * ds_de2;

        // l = R^T (p - c)
        let dc = -(self.rotation * dl);
        df[5] = dc.x;
        df[6] = dc.y;
        df[7] = dc.z;
        for k in 0..3 {
            df[8 + k] = dl.dot(self.d_rotation[k].transpose() * d);
        }

        // G = F^e1
        let dg_df = e1 * g / f;
        for i in 0..N_PARAMS {
            grad[i] = dg_df * df[i];
        }
        grad[3] += g * f.ln();

        g
    }
}

/// Objective value of the decision vector `x` over `points`.
///
/// Returns zero for an empty set of points.
pub fn objective_value(kind: ObjectiveKind, x: &[f64; N_PARAMS], points: &[[f64; 3]]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let frame = ShapeFrame::new(x);
    let w = match kind {
        ObjectiveKind::SumOfSquares => 1.0,
        ObjectiveKind::VolumeNormalized => frame.volume_weight(),
    };
    let sum = points
        .iter()
        .map(|p| {
            let r = w * (frame.residual(p) - 1.0);
            r * r
        })
        .sum::<f64>();
    sum / points.len() as f64
}

/// Objective gradient of the decision vector `x` over `points`, written into `grad`.
///
/// # Returns
///
/// The objective value.
pub fn objective_gradient(
    kind: ObjectiveKind,
    x: &[f64; N_PARAMS],
    points: &[[f64; 3]],
    grad: &mut [f64; N_PARAMS],
) -> f64 {
    grad.fill(0.0);
    if points.is_empty() {
        return 0.0;
    }

    let frame = ShapeFrame::new(x);
    let (w, dw) = match kind {
        ObjectiveKind::SumOfSquares => (1.0, [0.0; 3]),
        ObjectiveKind::VolumeNormalized => {
            let w = frame.volume_weight();
            (w, std::array::from_fn(|k| 0.5 * w / frame.dims[k]))
        }
    };

    let mut sum = 0.0;
    let mut dg = [0.0; N_PARAMS];
    for p in points {
        let g = frame.residual_gradient(p, &mut dg);
        let r = w * (g - 1.0);
        sum += r * r;
        for i in 0..N_PARAMS {
            grad[i] += 2.0 * r * w * dg[i];
        }
        for k in 0..3 {
            grad[k] += 2.0 * r * (g - 1.0) * dw[k];
        }
    }

    let n = points.len() as f64;
    grad.iter_mut().for_each(|v| *v /= n);
    sum / n
}
