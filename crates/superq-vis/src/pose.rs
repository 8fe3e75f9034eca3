use serde::{Deserialize, Serialize};
use superq_model::transforms::euler_zyz_to_rotation_matrix;

/// A candidate grasp pose of a hand, with its cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraspPose {
    /// Position and Euler ZYZ angles `[x, y, z, phi, theta, psi]`.
    pub pose: [f64; 6],
    /// Cost of the grasp, lower is better.
    pub cost: f64,
    /// Name of the hand, e.g. `right` or `left`.
    pub hand: String,
}

impl GraspPose {
    /// Create a grasp pose.
    pub fn new(pose: [f64; 6], cost: f64, hand: impl Into<String>) -> Self {
        Self {
            pose,
            cost,
            hand: hand.into(),
        }
    }

    /// Whether the pose holds a value; the all-zero pose marks a missing grasp.
    pub fn is_renderable(&self) -> bool {
        self.pose.iter().all(|v| v.is_finite()) && self.pose.iter().any(|v| *v != 0.0)
    }

    /// Row-major homogeneous transform of the pose.
    ///
    /// The rotation is `Rz(phi) * Ry(theta) * Rz(psi)` and the last column
    /// holds the position.
    pub fn transform(&self) -> [[f64; 4]; 4] {
        let r = euler_zyz_to_rotation_matrix(&[self.pose[3], self.pose[4], self.pose[5]]);
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            m[i][..3].copy_from_slice(&r[i]);
            m[i][3] = self.pose[i];
        }
        m[3][3] = 1.0;
        m
    }

    /// The position of the pose.
    pub fn position(&self) -> [f64; 3] {
        [self.pose[0], self.pose[1], self.pose[2]]
    }

    /// Caption of the pose, `"<hand> : <cost>"` with the cost on 3 significant digits.
    pub fn caption(&self) -> String {
        format!("{} : {}", self.hand, format_significant(self.cost, 3))
    }
}

/// Format `v` with `digits` significant digits the way `%g` does.
///
/// Trailing zeros are dropped and the scientific notation is used for
/// exponents below -4 or from `digits` on.
fn format_significant(v: f64, digits: usize) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let digits = digits.max(1);
    // the exponent after rounding, 9.996 becomes 10.0
    let rounded = format!("{:.*e}", digits - 1, v);
    let exp = rounded
        .rsplit_once('e')
        .and_then(|(_, e)| e.parse::<i32>().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= digits as i32 {
        let (mantissa, _) = rounded.split_once('e').unwrap_or((&rounded, ""));
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
