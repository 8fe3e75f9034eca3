use superq_model::pointcloud::downsample_uniform;
use superq_model::superquadric::{CENTER, DIMS, EXPS, MIN_EXP_EPS, N_PARAMS};
use superq_model::{PointCloud, Superquadric};
use superq_nlp::{FinalizeInfo, Nlp, NlpError, NlpInfo, SolverStatus};

use crate::bounds::{clamp_to_bounds, compute_bounds, compute_centroid, compute_x0, Bounds, MIN_DIM};
use crate::objective::{objective_gradient, objective_value, ObjectClass, ObjectiveKind, ShapeFrame};

/// Smallest number of points a superquadric can be fitted to.
pub const MIN_FIT_POINTS: usize = 3;

/// Lifecycle of a [`SuperqProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStage {
    /// No points or no configuration yet.
    Uninitialized,
    /// Points, bounds and starting point are set.
    Configured,
    /// A solver took the starting point and is evaluating the problem.
    Solving,
    /// The solver handed back its solution.
    Finalized,
}

impl FitStage {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Solving => "solving",
            Self::Finalized => "finalized",
        }
    }
}

/// The solution received from a solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProblemSolution {
    /// The decision vector, clamped so that it describes a valid superquadric.
    pub x: [f64; N_PARAMS],
    /// Objective value reported by the solver.
    pub obj_value: f64,
    /// Termination status reported by the solver.
    pub status: SolverStatus,
    /// Number of iterations performed by the solver.
    pub iterations: usize,
}

/// The superquadric fit posed as a nonlinear program.
///
/// The decision vector is the parameter vector of a [`Superquadric`]. The
/// problem optionally carries one constraint row keeping the centroid of the
/// points inside the shape, `0 <= G(x, centroid) <= 1`.
///
/// Example:
///
/// ```
/// use superq_estimator::problem::{FitStage, SuperqProblem};
/// use superq_estimator::objective::ObjectClass;
/// use superq_model::PointCloud;
/// use superq_nlp::LbfgsSolver;
///
/// let points = (0..20)
///     .map(|i| {
///         let a = i as f64 * 0.3;
///         [0.05 * a.cos(), 0.05 * a.sin(), 0.01 * (i % 3) as f64]
///     })
///     .collect::<Vec<_>>();
///
/// let mut problem = SuperqProblem::new();
/// problem.set_points(&PointCloud::new(points, None), 50)?;
/// problem.configure(true, ObjectClass::Default, &[[0.0, 1.0]; 11], false)?;
/// LbfgsSolver::default().solve(&mut problem);
///
/// assert_eq!(problem.stage(), FitStage::Finalized);
/// assert!(problem.result().is_valid());
/// # Ok::<(), superq_nlp::NlpError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SuperqProblem {
    points: Vec<[f64; 3]>,
    x0: [f64; N_PARAMS],
    bounds: Bounds,
    kind: ObjectiveKind,
    centroid: Option<[f64; 3]>,
    stage: FitStage,
    solution: Option<ProblemSolution>,
}

impl Default for SuperqProblem {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            x0: [0.0; N_PARAMS],
            bounds: [[0.0; 2]; N_PARAMS],
            kind: ObjectiveKind::VolumeNormalized,
            centroid: None,
            stage: FitStage::Uninitialized,
            solution: None,
        }
    }
}

impl SuperqProblem {
    /// Create an empty problem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the points to fit, keeping at most `max_points` of the working set of `cloud`.
    ///
    /// # Errors
    ///
    /// Fails once the problem is configured. A new fit needs a new problem.
    pub fn set_points(&mut self, cloud: &PointCloud, max_points: usize) -> Result<(), NlpError> {
        self.require(FitStage::Uninitialized)?;
        self.points = downsample_uniform(cloud.points(), max_points);
        log::debug!("fitting {} of {} points", self.points.len(), cloud.len());
        Ok(())
    }

    /// Compute the starting point and the bounds of the problem.
    ///
    /// # Arguments
    ///
    /// * `auto_bounds` - Derive the bounds from the points instead of using `default_bounds`.
    /// * `class` - The object class, which selects the objective and the exponent range.
    /// * `default_bounds` - The bounds used when `auto_bounds` is false.
    /// * `constrain_centroid` - Add the constraint keeping the centroid inside the shape.
    ///
    /// # Errors
    ///
    /// Fails if the problem is already configured, or if fewer than
    /// [`MIN_FIT_POINTS`] points were set.
    pub fn configure(
        &mut self,
        auto_bounds: bool,
        class: ObjectClass,
        default_bounds: &Bounds,
        constrain_centroid: bool,
    ) -> Result<(), NlpError> {
        self.require(FitStage::Uninitialized)?;
        if self.points.len() < MIN_FIT_POINTS {
            return Err(NlpError::InvalidDefinition(format!(
                "{} points given, at least {MIN_FIT_POINTS} are needed",
                self.points.len()
            )));
        }

        let mut x0 = compute_x0(&self.points);
        let bounds = compute_bounds(&self.points, &x0, auto_bounds, class, default_bounds);
        clamp_to_bounds(&mut x0, &bounds);

        self.x0 = x0;
        self.bounds = bounds;
        self.kind = class.objective();
        self.centroid = constrain_centroid.then(|| compute_centroid(&self.points));
        self.stage = FitStage::Configured;

        log::debug!("configured {class} fit with bounds {bounds:?}");
        Ok(())
    }

    /// Current stage of the problem.
    pub fn stage(&self) -> FitStage {
        self.stage
    }

    /// The points being fitted.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// The starting point, after clamping into the bounds.
    pub fn x0(&self) -> &[f64; N_PARAMS] {
        &self.x0
    }

    /// The variable bounds.
    pub fn variable_bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// The objective selected by the object class.
    pub fn objective_kind(&self) -> ObjectiveKind {
        self.kind
    }

    /// The solution handed back by the solver, if any.
    pub fn solution(&self) -> Option<&ProblemSolution> {
        self.solution.as_ref()
    }

    /// The fitted superquadric, or the all-zero one before a solution is available.
    pub fn result(&self) -> Superquadric {
        self.solution
            .and_then(|s| Superquadric::from_params(&s.x).ok())
            .unwrap_or_default()
    }

    fn require(&self, stage: FitStage) -> Result<(), NlpError> {
        if self.stage != stage {
            return Err(NlpError::InvalidStage(self.stage.name()));
        }
        Ok(())
    }

    fn decision(x: &[f64]) -> Result<&[f64; N_PARAMS], NlpError> {
        x.try_into().map_err(|_| NlpError::DimensionMismatch {
            expected: N_PARAMS,
            actual: x.len(),
        })
    }

    fn check_len(expected: usize, actual: usize) -> Result<(), NlpError> {
        if expected != actual {
            return Err(NlpError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

impl Nlp for SuperqProblem {
    fn info(&self) -> NlpInfo {
        match self.centroid {
            Some(_) => NlpInfo {
                n: N_PARAMS,
                m: 1,
                nnz_jac_g: N_PARAMS,
            },
            None => NlpInfo {
                n: N_PARAMS,
                m: 0,
                nnz_jac_g: 0,
            },
        }
    }

    fn bounds(
        &self,
        x_l: &mut [f64],
        x_u: &mut [f64],
        g_l: &mut [f64],
        g_u: &mut [f64],
    ) -> Result<(), NlpError> {
        if !matches!(self.stage, FitStage::Configured | FitStage::Solving) {
            return Err(NlpError::InvalidStage(self.stage.name()));
        }
        let info = self.info();
        Self::check_len(info.n, x_l.len())?;
        Self::check_len(info.n, x_u.len())?;
        Self::check_len(info.m, g_l.len())?;
        Self::check_len(info.m, g_u.len())?;

        for (i, [lo, hi]) in self.bounds.iter().enumerate() {
            x_l[i] = *lo;
            x_u[i] = *hi;
        }
        if info.m == 1 {
            g_l[0] = 0.0;
            g_u[0] = 1.0;
        }
        Ok(())
    }

    // Lengths and the center are expressed in units of the largest initial semi-axis.
    fn variable_scaling(&self, scaling: &mut [f64]) -> Result<bool, NlpError> {
        if !matches!(self.stage, FitStage::Configured | FitStage::Solving) {
            return Err(NlpError::InvalidStage(self.stage.name()));
        }
        Self::check_len(N_PARAMS, scaling.len())?;

        let extent = self.x0[DIMS].iter().fold(MIN_DIM, |acc, d| acc.max(*d));
        scaling.fill(1.0);
        for i in DIMS.chain(CENTER) {
            scaling[i] = 1.0 / extent;
        }
        Ok(true)
    }

    fn starting_point(&mut self, x: &mut [f64]) -> Result<(), NlpError> {
        self.require(FitStage::Configured)?;
        Self::check_len(N_PARAMS, x.len())?;
        x.copy_from_slice(&self.x0);
        self.stage = FitStage::Solving;
        Ok(())
    }

    fn eval_f(&self, x: &[f64]) -> Result<f64, NlpError> {
        self.require(FitStage::Solving)?;
        let value = objective_value(self.kind, Self::decision(x)?, &self.points);
        if !value.is_finite() {
            return Err(NlpError::InvalidNumber("objective"));
        }
        Ok(value)
    }

    fn eval_grad_f(&self, x: &[f64], grad_f: &mut [f64]) -> Result<(), NlpError> {
        self.require(FitStage::Solving)?;
        let x = Self::decision(x)?;
        Self::check_len(N_PARAMS, grad_f.len())?;

        let mut grad = [0.0; N_PARAMS];
        objective_gradient(self.kind, x, &self.points, &mut grad);
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(NlpError::InvalidNumber("objective gradient"));
        }
        grad_f.copy_from_slice(&grad);
        Ok(())
    }

    fn eval_g(&self, x: &[f64], g: &mut [f64]) -> Result<(), NlpError> {
        self.require(FitStage::Solving)?;
        let x = Self::decision(x)?;
        let Some(centroid) = self.centroid else {
            return Self::check_len(0, g.len());
        };
        Self::check_len(1, g.len())?;

        g[0] = ShapeFrame::new(x).residual(&centroid);
        if !g[0].is_finite() {
            return Err(NlpError::InvalidNumber("constraints"));
        }
        Ok(())
    }

    fn jacobian_structure(
        &self,
        rows: &mut [usize],
        cols: &mut [usize],
    ) -> Result<(), NlpError> {
        let nnz = self.info().nnz_jac_g;
        Self::check_len(nnz, rows.len())?;
        Self::check_len(nnz, cols.len())?;
        for j in 0..nnz {
            rows[j] = 0;
            cols[j] = j;
        }
        Ok(())
    }

    fn eval_jac_g(&self, x: &[f64], values: &mut [f64]) -> Result<(), NlpError> {
        self.require(FitStage::Solving)?;
        let x = Self::decision(x)?;
        let Some(centroid) = self.centroid else {
            return Self::check_len(0, values.len());
        };
        Self::check_len(N_PARAMS, values.len())?;

        let mut grad = [0.0; N_PARAMS];
        ShapeFrame::new(x).residual_gradient(&centroid, &mut grad);
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(NlpError::InvalidNumber("constraint jacobian"));
        }
        values.copy_from_slice(&grad);
        Ok(())
    }

    fn finalize_solution(&mut self, solution: FinalizeInfo<'_>) {
        let mut x = match Self::decision(solution.x) {
            Ok(x) if x.iter().all(|v| v.is_finite()) => *x,
            _ => {
                log::warn!("solver returned an unusable solution, keeping the starting point");
                self.x0
            }
        };
        for d in &mut x[DIMS] {
            *d = d.max(MIN_DIM);
        }
        for e in &mut x[EXPS] {
            *e = e.max(MIN_EXP_EPS);
        }

        self.solution = Some(ProblemSolution {
            x,
            obj_value: solution.obj_value,
            status: solution.status,
            iterations: solution.iterations,
        });
        self.stage = FitStage::Finalized;
    }
}
