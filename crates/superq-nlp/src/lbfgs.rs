//! Projected limited-memory BFGS solver with an augmented Lagrangian for inequality rows.
//!
//! The variable box is handled exactly by projection. Every iteration splits
//! the variables into a binding set (at a bound, or within a small distance of
//! it, with the gradient pushing outwards) and a free set. Free variables move
//! along the limited-memory quasi-Newton direction, binding ones along the
//! projected gradient, and the step is accepted with an Armijo test along the
//! projection arc. When the quasi-Newton direction fails the curvature pairs
//! are dropped and the iteration falls back to a projected gradient step.
//!
//! Constraint rows `g_l <= g(x) <= g_u` are moved into the merit function with
//! the Powell-Hestenes-Rockafellar augmented Lagrangian
//!
//! ```text
//! L(x) = s f(x) + sum 1/(2 rho) (max(0, mu + rho c(x))^2 - mu^2)
//! ```
//!
//! where `c = g - g_u` or `c = g_l - g` and `s` is the objective scaling.
//! Multipliers are updated between inner solves and the penalty grows while
//! the violation does not shrink fast enough.
//!
//! When the problem provides [`Nlp::variable_scaling`] the iterations run on
//! the scaled variables `z = D x`, so that tolerances apply to `z`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::problem::{FinalizeInfo, Nlp, NlpError, NlpInfo, BOUND_INF};
use crate::status::SolverStatus;

/// Parameters controlling the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    /// Convergence threshold on the infinity norm of the (scaled) projected gradient.
    pub tol: f64,
    /// Looser threshold accepted when the line search stalls.
    pub acceptable_tol: f64,
    /// Maximum constraint violation of a converged point.
    pub constr_viol_tol: f64,
    /// Maximum number of iterations, summed over all inner solves.
    pub max_iter: usize,
    /// Maximum wall time in seconds.
    pub max_cpu_time: f64,
    /// Number of correction pairs kept by the limited-memory approximation.
    pub memory: usize,
    /// Maximum number of augmented Lagrangian updates.
    pub max_outer_iter: usize,
    /// Initial penalty parameter.
    pub penalty_init: f64,
    /// Penalty growth factor.
    pub penalty_factor: f64,
    /// Scale the objective so that its initial gradient has unit infinity norm.
    pub gradient_scaling: bool,
    /// Use the variable scaling provided by the problem.
    pub variable_scaling: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            acceptable_tol: 1e-4,
            constr_viol_tol: 1e-6,
            max_iter: 2000,
            max_cpu_time: 5.0,
            memory: 10,
            max_outer_iter: 30,
            penalty_init: 10.0,
            penalty_factor: 10.0,
            gradient_scaling: true,
            variable_scaling: true,
        }
    }
}

impl SolverOptions {
    /// Set the convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the maximum wall time in seconds.
    pub fn with_max_cpu_time(mut self, seconds: f64) -> Self {
        self.max_cpu_time = seconds;
        self
    }
}

/// Summary of a solve, mirroring what the problem received in `finalize_solution`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveSummary {
    /// Reason for termination.
    pub status: SolverStatus,
    /// Objective value at the returned iterate, NaN when unavailable.
    pub obj_value: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Maximum constraint violation at the returned iterate, NaN when unavailable.
    pub constraint_violation: f64,
}

/// Projected limited-memory BFGS solver.
#[derive(Debug, Clone, Default)]
pub struct LbfgsSolver {
    /// Solver parameters.
    pub options: SolverOptions,
}

// Validated bounds, scaling and Jacobian structure of a problem.
struct Setup {
    info: NlpInfo,
    x_l: Vec<f64>,
    x_u: Vec<f64>,
    // bounds of the scaled variables
    z_l: Vec<f64>,
    z_u: Vec<f64>,
    scaling: Vec<f64>,
    g_l: Vec<f64>,
    g_u: Vec<f64>,
    jac_rows: Vec<usize>,
    jac_cols: Vec<usize>,
}

struct Outcome {
    status: SolverStatus,
    obj_value: f64,
    g: Vec<f64>,
    iterations: usize,
    violation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InnerExit {
    Converged,
    TinyStep,
    MaxIter,
    CpuTime,
}

#[derive(Debug, Clone, Copy)]
struct InnerSummary {
    exit: InnerExit,
    projected_gradient: f64,
}

// One curvature pair of the limited-memory approximation.
struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

impl LbfgsSolver {
    /// Sufficient decrease parameter of the line search.
    const GAMMA: f64 = 1e-4;
    /// Safeguards of the quadratic interpolation, relative to the current step.
    const SIGMA1: f64 = 0.1;
    const SIGMA2: f64 = 0.5;
    /// Maximum number of backtracking steps per iteration.
    const MAX_BACKTRACKS: usize = 60;
    /// Largest distance to a bound at which a variable can be binding.
    const ACTIVITY_TOL: f64 = 1e-3;

    /// Create a solver with the given options.
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Solve the problem.
    ///
    /// The problem receives exactly one call to [`Nlp::finalize_solution`],
    /// whatever the outcome.
    pub fn solve<P: Nlp>(&self, problem: &mut P) -> SolveSummary {
        let info = problem.info();
        let mut x = vec![0.0; info.n];

        let outcome = match self.setup(problem, info, &mut x) {
            Ok(setup) => self.run(problem, &setup, &mut x),
            Err(e) => {
                log::warn!("cannot solve the problem: {e}");
                Outcome {
                    status: match e {
                        NlpError::InvalidNumber(_) => SolverStatus::InvalidNumberDetected,
                        _ => SolverStatus::InvalidProblemDefinition,
                    },
                    obj_value: f64::NAN,
                    g: Vec::new(),
                    iterations: 0,
                    violation: f64::NAN,
                }
            }
        };

        log::debug!(
            "solver finished after {} iterations: {} (objective {:e})",
            outcome.iterations,
            outcome.status,
            outcome.obj_value
        );

        problem.finalize_solution(FinalizeInfo {
            status: outcome.status,
            x: &x,
            g: &outcome.g,
            obj_value: outcome.obj_value,
            iterations: outcome.iterations,
        });

        SolveSummary {
            status: outcome.status,
            obj_value: outcome.obj_value,
            iterations: outcome.iterations,
            constraint_violation: outcome.violation,
        }
    }

    fn setup<P: Nlp>(
        &self,
        problem: &mut P,
        info: NlpInfo,
        x: &mut [f64],
    ) -> Result<Setup, NlpError> {
        if info.n == 0 {
            return Err(NlpError::InvalidDefinition("no decision variables".to_string()));
        }

        let mut setup = Setup {
            info,
            x_l: vec![-BOUND_INF; info.n],
            x_u: vec![BOUND_INF; info.n],
            z_l: Vec::new(),
            z_u: Vec::new(),
            scaling: vec![1.0; info.n],
            g_l: vec![-BOUND_INF; info.m],
            g_u: vec![BOUND_INF; info.m],
            jac_rows: vec![0; info.nnz_jac_g],
            jac_cols: vec![0; info.nnz_jac_g],
        };
        problem.bounds(&mut setup.x_l, &mut setup.x_u, &mut setup.g_l, &mut setup.g_u)?;

        for (i, (lo, hi)) in setup.x_l.iter().zip(setup.x_u.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(NlpError::InvalidDefinition(format!(
                    "variable {i} has bounds [{lo}, {hi}]"
                )));
            }
        }
        for (i, (lo, hi)) in setup.g_l.iter().zip(setup.g_u.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(NlpError::InvalidDefinition(format!(
                    "constraint {i} has bounds [{lo}, {hi}]"
                )));
            }
        }

        if self.options.variable_scaling && problem.variable_scaling(&mut setup.scaling)? {
            if let Some(i) = setup.scaling.iter().position(|s| !s.is_finite() || *s <= 0.0) {
                return Err(NlpError::InvalidDefinition(format!(
                    "variable {i} has scaling {}",
                    setup.scaling[i]
                )));
            }
        } else {
            setup.scaling.fill(1.0);
        }
        setup.z_l = setup.scale_bounds(&setup.x_l);
        setup.z_u = setup.scale_bounds(&setup.x_u);

        if info.nnz_jac_g > 0 {
            problem.jacobian_structure(&mut setup.jac_rows, &mut setup.jac_cols)?;
            let out_of_range = setup
                .jac_rows
                .iter()
                .zip(setup.jac_cols.iter())
                .any(|(&r, &c)| r >= info.m || c >= info.n);
            if out_of_range {
                return Err(NlpError::InvalidDefinition(
                    "jacobian structure entry out of range".to_string(),
                ));
            }
        }

        problem.starting_point(x)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(NlpError::InvalidNumber("starting point"));
        }
        project(x, &setup.x_l, &setup.x_u);

        Ok(setup)
    }

    fn run<P: Nlp>(&self, problem: &P, setup: &Setup, x: &mut [f64]) -> Outcome {
        let mut z = setup.to_scaled(x);
        let mut iterations = 0;
        let result = self.iterate(problem, setup, &mut z, &mut iterations);

        // z is the last accepted iterate, also after a failed evaluation
        x.copy_from_slice(&setup.to_unscaled(&z));
        project(x, &setup.x_l, &setup.x_u);

        let status = result.unwrap_or_else(|e| {
            log::warn!("solver stopped on evaluation error: {e}");
            match e {
                NlpError::InvalidNumber(_) => SolverStatus::InvalidNumberDetected,
                NlpError::InvalidStage(_) | NlpError::InvalidDefinition(_) => {
                    SolverStatus::InvalidProblemDefinition
                }
                NlpError::DimensionMismatch { .. } => SolverStatus::ErrorInStepComputation,
            }
        });

        let obj_value = problem
            .eval_f(x)
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(f64::NAN);

        let mut g = vec![0.0; setup.info.m];
        let violation = if g.is_empty() {
            0.0
        } else {
            match problem.eval_g(x, &mut g) {
                Ok(()) if g.iter().all(|v| v.is_finite()) => setup.violation(&g),
                _ => {
                    g.clear();
                    f64::NAN
                }
            }
        };

        Outcome {
            status,
            obj_value,
            g,
            iterations,
            violation,
        }
    }

    fn iterate<P: Nlp>(
        &self,
        problem: &P,
        setup: &Setup,
        z: &mut [f64],
        iterations: &mut usize,
    ) -> Result<SolverStatus, NlpError> {
        let opts = &self.options;
        let deadline = Duration::try_from_secs_f64(opts.max_cpu_time)
            .ok()
            .and_then(|d| Instant::now().checked_add(d));

        let scale = if opts.gradient_scaling {
            let mut grad = vec![0.0; setup.info.n];
            problem.eval_grad_f(&setup.to_unscaled(z), &mut grad)?;
            let norm = grad
                .iter()
                .zip(setup.scaling.iter())
                .fold(0.0, |acc: f64, (g, s)| acc.max((g / s).abs()));
            if !norm.is_finite() {
                return Err(NlpError::InvalidNumber("objective gradient"));
            }
            if norm > 0.0 {
                (1.0 / norm).clamp(1e-8, 1e8)
            } else {
                1.0
            }
        } else {
            1.0
        };

        let mut merit = Merit {
            problem,
            setup,
            mu_l: vec![0.0; setup.info.m],
            mu_u: vec![0.0; setup.info.m],
            rho: opts.penalty_init.max(f64::EPSILON),
            scale,
        };

        if setup.info.m == 0 {
            let inner = self.minimize(&merit, z, iterations, deadline)?;
            return Ok(self.status_from_inner(inner));
        }

        let mut prev_violation = f64::INFINITY;
        let mut last = None;
        for outer in 0..opts.max_outer_iter.max(1) {
            let inner = self.minimize(&merit, z, iterations, deadline)?;
            let g = merit.constraints(&setup.to_unscaled(z))?;
            let violation = setup.violation(&g);
            log::debug!(
                "augmented lagrangian update {outer}: violation {violation:.3e}, penalty {:.3e}",
                merit.rho
            );
            last = Some((inner, violation));

            if violation <= opts.constr_viol_tol
                || matches!(inner.exit, InnerExit::MaxIter | InnerExit::CpuTime)
            {
                break;
            }

            merit.update_multipliers(&g);
            if violation > 0.25 * prev_violation {
                merit.rho *= opts.penalty_factor;
            }
            prev_violation = violation;
        }

        Ok(match last {
            Some((inner, violation)) if violation > opts.constr_viol_tol => match inner.exit {
                InnerExit::MaxIter => SolverStatus::MaximumIterationsExceeded,
                InnerExit::CpuTime => SolverStatus::MaximumCpuTimeExceeded,
                _ => SolverStatus::LocalInfeasibility,
            },
            Some((inner, _)) => self.status_from_inner(inner),
            None => SolverStatus::InvalidProblemDefinition,
        })
    }

    fn status_from_inner(&self, inner: InnerSummary) -> SolverStatus {
        match inner.exit {
            InnerExit::Converged => SolverStatus::Success,
            _ if inner.projected_gradient <= self.options.acceptable_tol => {
                SolverStatus::SolvedToAcceptableLevel
            }
            InnerExit::TinyStep => SolverStatus::StopAtTinyStep,
            InnerExit::MaxIter => SolverStatus::MaximumIterationsExceeded,
            InnerExit::CpuTime => SolverStatus::MaximumCpuTimeExceeded,
        }
    }

    // Minimize the merit function over the scaled box, starting at `z`.
    //
    // The merit decreases monotonically, so `z` always holds the best iterate
    // of this inner solve, including when an evaluation error is returned.
    fn minimize<P: Nlp>(
        &self,
        merit: &Merit<'_, P>,
        z: &mut [f64],
        iterations: &mut usize,
        deadline: Option<Instant>,
    ) -> Result<InnerSummary, NlpError> {
        let opts = &self.options;
        let (lo, hi) = (&merit.setup.z_l, &merit.setup.z_u);
        let n = z.len();

        let mut grad = vec![0.0; n];
        let mut f = merit.value_and_gradient(z, &mut grad)?;
        let mut pg = projected_gradient_norm(z, &grad, lo, hi);

        let mut pairs: VecDeque<Correction> = VecDeque::with_capacity(opts.memory.max(1));
        let mut binding = vec![false; n];
        let mut d = vec![0.0; n];
        let mut z_new = vec![0.0; n];
        let mut grad_new = vec![0.0; n];

        let exit = loop {
            if pg <= opts.tol {
                break InnerExit::Converged;
            }
            if *iterations >= opts.max_iter {
                break InnerExit::MaxIter;
            }
            if deadline.is_some_and(|t| Instant::now() >= t) {
                break InnerExit::CpuTime;
            }
            *iterations += 1;

            let quasi_newton = !pairs.is_empty();
            if quasi_newton {
                let eps = pg.min(Self::ACTIVITY_TOL);
                for i in 0..n {
                    binding[i] = (z[i] <= lo[i] + eps && grad[i] > 0.0)
                        || (z[i] >= hi[i] - eps && grad[i] < 0.0);
                    d[i] = if binding[i] { 0.0 } else { grad[i] };
                }
                two_loop(&pairs, &mut d);
                for i in 0..n {
                    d[i] = if binding[i] {
                        (z[i] - grad[i]).max(lo[i]).min(hi[i]) - z[i]
                    } else {
                        -d[i]
                    };
                }
            }

            let gtd = dot(&grad, &d);
            if !quasi_newton || gtd >= 0.0 || !gtd.is_finite() {
                pairs.clear();
                let g_norm = inf_norm(&grad);
                let lambda = if g_norm > 0.0 { 1.0 / g_norm } else { 1.0 };
                for i in 0..n {
                    d[i] = (z[i] - lambda * grad[i]).max(lo[i]).min(hi[i]) - z[i];
                }
                if dot(&grad, &d) >= 0.0 {
                    break InnerExit::TinyStep;
                }
            }

            let min_step = f64::EPSILON * (1.0 + inf_norm(z));
            let d_norm = inf_norm(&d);

            let mut alpha = 1.0;
            let mut accepted = false;
            for _ in 0..Self::MAX_BACKTRACKS {
                let mut decrease = 0.0;
                for i in 0..n {
                    z_new[i] = (z[i] + alpha * d[i]).max(lo[i]).min(hi[i]);
                    decrease += grad[i] * (z_new[i] - z[i]);
                }
                match merit.value(&z_new) {
                    Ok(f_trial) if decrease < 0.0 && f_trial <= f + Self::GAMMA * decrease => {
                        accepted = true;
                        break;
                    }
                    Ok(f_trial) => {
                        let denom = f_trial - f - decrease;
                        let alpha_q = -0.5 * alpha * decrease / denom;
                        alpha = if decrease < 0.0
                            && denom > 0.0
                            && alpha_q >= Self::SIGMA1 * alpha
                            && alpha_q <= Self::SIGMA2 * alpha
                        {
                            alpha_q
                        } else {
                            0.5 * alpha
                        };
                    }
                    Err(NlpError::InvalidNumber(_)) => alpha *= 0.5,
                    Err(e) => return Err(e),
                }
                if alpha * d_norm < min_step {
                    break;
                }
            }

            if !accepted {
                if pairs.is_empty() {
                    break InnerExit::TinyStep;
                }
                log::debug!("line search failed, restarting from the projected gradient");
                pairs.clear();
                continue;
            }

            let f_new = merit.value_and_gradient(&z_new, &mut grad_new)?;

            let s: Vec<f64> = z_new.iter().zip(z.iter()).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = grad_new.iter().zip(grad.iter()).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > f64::EPSILON * dot(&y, &y) && sy > 0.0 {
                if pairs.len() >= opts.memory.max(1) {
                    pairs.pop_front();
                }
                pairs.push_back(Correction { s, y, rho: 1.0 / sy });
            }

            z.copy_from_slice(&z_new);
            grad.copy_from_slice(&grad_new);
            f = f_new;
            pg = projected_gradient_norm(z, &grad, lo, hi);

            log::debug!(
                "lbfgs iteration {}: merit {:.6e}, projected gradient {:.3e}, step {:.3e}",
                *iterations,
                f,
                pg,
                alpha
            );
        };

        Ok(InnerSummary {
            exit,
            projected_gradient: pg,
        })
    }
}

impl Setup {
    fn violation(&self, g: &[f64]) -> f64 {
        g.iter()
            .zip(self.g_l.iter().zip(self.g_u.iter()))
            .map(|(&gi, (&lo, &hi))| (gi - hi).max(lo - gi).max(0.0))
            .fold(0.0, f64::max)
    }

    // Infinite bounds stay infinite.
    fn scale_bounds(&self, bounds: &[f64]) -> Vec<f64> {
        bounds
            .iter()
            .zip(self.scaling.iter())
            .map(|(&b, &s)| if b.abs() >= BOUND_INF { b } else { b * s })
            .collect()
    }

    fn to_scaled(&self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(self.scaling.iter()).map(|(v, s)| v * s).collect()
    }

    fn to_unscaled(&self, z: &[f64]) -> Vec<f64> {
        z.iter().zip(self.scaling.iter()).map(|(v, s)| v / s).collect()
    }
}

// Augmented Lagrangian merit function of a problem, on the scaled variables.
struct Merit<'a, P: Nlp> {
    problem: &'a P,
    setup: &'a Setup,
    mu_l: Vec<f64>,
    mu_u: Vec<f64>,
    rho: f64,
    scale: f64,
}

impl<P: Nlp> Merit<'_, P> {
    fn constraints(&self, x: &[f64]) -> Result<Vec<f64>, NlpError> {
        let mut g = vec![0.0; self.setup.info.m];
        if !g.is_empty() {
            self.problem.eval_g(x, &mut g)?;
            if g.iter().any(|v| !v.is_finite()) {
                return Err(NlpError::InvalidNumber("constraints"));
            }
        }
        Ok(g)
    }

    // Coefficients multiplying the gradient of each row of g.
    fn row_weights(&self, g: &[f64]) -> Vec<f64> {
        (0..g.len())
            .map(|i| {
                let mut w = 0.0;
                if self.setup.g_u[i] < BOUND_INF {
                    w += (self.mu_u[i] + self.rho * (g[i] - self.setup.g_u[i])).max(0.0);
                }
                if self.setup.g_l[i] > -BOUND_INF {
                    w -= (self.mu_l[i] + self.rho * (self.setup.g_l[i] - g[i])).max(0.0);
                }
                w
            })
            .collect()
    }

    fn penalty(&self, g: &[f64]) -> f64 {
        let mut p = 0.0;
        for (i, &gi) in g.iter().enumerate() {
            if self.setup.g_u[i] < BOUND_INF {
                let t = (self.mu_u[i] + self.rho * (gi - self.setup.g_u[i])).max(0.0);
                p += (t * t - self.mu_u[i] * self.mu_u[i]) / (2.0 * self.rho);
            }
            if self.setup.g_l[i] > -BOUND_INF {
                let t = (self.mu_l[i] + self.rho * (self.setup.g_l[i] - gi)).max(0.0);
                p += (t * t - self.mu_l[i] * self.mu_l[i]) / (2.0 * self.rho);
            }
        }
        p
    }

    fn value_at(&self, x: &[f64]) -> Result<f64, NlpError> {
        let f = self.problem.eval_f(x)?;
        if !f.is_finite() {
            return Err(NlpError::InvalidNumber("objective"));
        }
        let g = self.constraints(x)?;
        Ok(self.scale * f + self.penalty(&g))
    }

    fn value(&self, z: &[f64]) -> Result<f64, NlpError> {
        self.value_at(&self.setup.to_unscaled(z))
    }

    fn value_and_gradient(&self, z: &[f64], grad: &mut [f64]) -> Result<f64, NlpError> {
        let x = self.setup.to_unscaled(z);
        let value = self.value_at(&x)?;

        self.problem.eval_grad_f(&x, grad)?;
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(NlpError::InvalidNumber("objective gradient"));
        }
        for (v, s) in grad.iter_mut().zip(self.setup.scaling.iter()) {
            *v *= self.scale / s;
        }

        if self.setup.info.nnz_jac_g > 0 {
            let g = self.constraints(&x)?;
            let weights = self.row_weights(&g);
            let mut values = vec![0.0; self.setup.info.nnz_jac_g];
            self.problem.eval_jac_g(&x, &mut values)?;
            for (k, v) in values.iter().enumerate() {
                if !v.is_finite() {
                    return Err(NlpError::InvalidNumber("constraint jacobian"));
                }
                let col = self.setup.jac_cols[k];
                grad[col] += weights[self.setup.jac_rows[k]] * v / self.setup.scaling[col];
            }
        }

        Ok(value)
    }

    fn update_multipliers(&mut self, g: &[f64]) {
        for (i, &gi) in g.iter().enumerate() {
            if self.setup.g_u[i] < BOUND_INF {
                self.mu_u[i] = (self.mu_u[i] + self.rho * (gi - self.setup.g_u[i])).max(0.0);
            }
            if self.setup.g_l[i] > -BOUND_INF {
                self.mu_l[i] = (self.mu_l[i] + self.rho * (self.setup.g_l[i] - gi)).max(0.0);
            }
        }
    }
}

// Replace `q` by H q, H being the inverse Hessian approximation of the pairs.
fn two_loop(pairs: &VecDeque<Correction>, q: &mut [f64]) {
    let mut alphas = Vec::with_capacity(pairs.len());
    for c in pairs.iter().rev() {
        let a = c.rho * dot(&c.s, q);
        axpy(-a, &c.y, q);
        alphas.push(a);
    }

    if let Some(last) = pairs.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        q.iter_mut().for_each(|v| *v *= gamma);
    }

    for (c, a) in pairs.iter().zip(alphas.iter().rev()) {
        let b = c.rho * dot(&c.y, q);
        axpy(a - b, &c.s, q);
    }
}

fn project(x: &mut [f64], lo: &[f64], hi: &[f64]) {
    for ((v, &l), &h) in x.iter_mut().zip(lo.iter()).zip(hi.iter()) {
        *v = v.max(l).min(h);
    }
}

fn projected_gradient_norm(x: &[f64], grad: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    (0..x.len())
        .map(|i| ((x[i] - grad[i]).max(lo[i]).min(hi[i]) - x[i]).abs())
        .fold(0.0, f64::max)
}

fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x.iter()).for_each(|(yi, xi)| *yi += a * xi);
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use approx::assert_relative_eq;

    // f = sum w_i (x_i - c_i)^2, optionally with x_0 + x_1 <= limit
    struct Quadratic {
        target: Vec<f64>,
        weights: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
        start: Vec<f64>,
        sum_limit: Option<f64>,
        scaling: Option<Vec<f64>>,
        poison: bool,
        gradient_budget: Option<usize>,
        gradient_calls: Cell<usize>,
        finalized: usize,
        solution: Vec<f64>,
        status: Option<SolverStatus>,
    }

    impl Quadratic {
        fn new(target: Vec<f64>) -> Self {
            let n = target.len();
            Self {
                weights: (0..n).map(|i| 1.0 + 10.0 * i as f64).collect(),
                lower: vec![-BOUND_INF; n],
                upper: vec![BOUND_INF; n],
                start: vec![0.0; n],
                target,
                sum_limit: None,
                scaling: None,
                poison: false,
                gradient_budget: None,
                gradient_calls: Cell::new(0),
                finalized: 0,
                solution: Vec::new(),
                status: None,
            }
        }
    }

    impl Nlp for Quadratic {
        fn info(&self) -> NlpInfo {
            let constrained = self.sum_limit.is_some();
            NlpInfo {
                n: self.target.len(),
                m: usize::from(constrained),
                nnz_jac_g: if constrained { 2 } else { 0 },
            }
        }

        fn bounds(
            &self,
            x_l: &mut [f64],
            x_u: &mut [f64],
            g_l: &mut [f64],
            g_u: &mut [f64],
        ) -> Result<(), NlpError> {
            x_l.copy_from_slice(&self.lower);
            x_u.copy_from_slice(&self.upper);
            if let Some(limit) = self.sum_limit {
                g_l[0] = -BOUND_INF;
                g_u[0] = limit;
            }
            Ok(())
        }

        fn variable_scaling(&self, scaling: &mut [f64]) -> Result<bool, NlpError> {
            match &self.scaling {
                Some(s) => {
                    scaling.copy_from_slice(s);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn starting_point(&mut self, x: &mut [f64]) -> Result<(), NlpError> {
            x.copy_from_slice(&self.start);
            Ok(())
        }

        fn eval_f(&self, x: &[f64]) -> Result<f64, NlpError> {
            if self.poison {
                return Ok(f64::NAN);
            }
            Ok(x.iter()
                .zip(self.target.iter().zip(self.weights.iter()))
                .map(|(xi, (ci, wi))| wi * (xi - ci).powi(2))
                .sum())
        }

        fn eval_grad_f(&self, x: &[f64], grad_f: &mut [f64]) -> Result<(), NlpError> {
            self.gradient_calls.set(self.gradient_calls.get() + 1);
            if self
                .gradient_budget
                .is_some_and(|budget| self.gradient_calls.get() > budget)
            {
                return Err(NlpError::InvalidNumber("objective gradient"));
            }
            for i in 0..x.len() {
                grad_f[i] = 2.0 * self.weights[i] * (x[i] - self.target[i]);
            }
            Ok(())
        }

        fn eval_g(&self, x: &[f64], g: &mut [f64]) -> Result<(), NlpError> {
            g[0] = x[0] + x[1];
            Ok(())
        }

        fn jacobian_structure(
            &self,
            rows: &mut [usize],
            cols: &mut [usize],
        ) -> Result<(), NlpError> {
            rows.copy_from_slice(&[0, 0]);
            cols.copy_from_slice(&[0, 1]);
            Ok(())
        }

        fn eval_jac_g(&self, _x: &[f64], values: &mut [f64]) -> Result<(), NlpError> {
            values.copy_from_slice(&[1.0, 1.0]);
            Ok(())
        }

        fn finalize_solution(&mut self, solution: FinalizeInfo<'_>) {
            self.finalized += 1;
            self.solution = solution.x.to_vec();
            self.status = Some(solution.status);
        }
    }

    #[test]
    fn test_unconstrained_quadratic() {
        let mut problem = Quadratic::new(vec![1.0, -2.0, 0.5, 3.0]);
        let options = SolverOptions::default().with_tol(1e-10);
        let summary = LbfgsSolver::new(options).solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::Success);
        assert_eq!(problem.finalized, 1);
        assert_eq!(problem.status, Some(SolverStatus::Success));
        for (x, c) in problem.solution.iter().zip([1.0, -2.0, 0.5, 3.0]) {
            assert_relative_eq!(*x, c, epsilon = 1e-5);
        }
        assert!(summary.obj_value < 1e-8);
    }

    #[test]
    fn test_ill_conditioned_quadratic() {
        let target = vec![0.3, -0.7, 1.1, 2.0, -1.5, 0.9];
        let mut problem = Quadratic::new(target.clone());
        problem.weights = vec![1.0, 10.0, 100.0, 1e3, 1e4, 1e5];
        let options = SolverOptions::default().with_tol(1e-10);
        let summary = LbfgsSolver::new(options).solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::Success);
        assert!(summary.iterations < 200, "iterations: {}", summary.iterations);
        for (x, c) in problem.solution.iter().zip(target) {
            assert_relative_eq!(*x, c, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_bounds_are_active() {
        let mut problem = Quadratic::new(vec![1.0, -2.0, 0.5]);
        problem.lower = vec![-1.0, -1.0, -1.0];
        problem.upper = vec![0.5, 1.0, 1.0];
        // a starting point outside the box is projected
        problem.start = vec![5.0, -5.0, 0.0];
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::Success);
        assert_relative_eq!(problem.solution[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(problem.solution[1], -1.0, epsilon = 1e-9);
        assert_relative_eq!(problem.solution[2], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_variable_scaling() {
        let mut problem = Quadratic::new(vec![1e-3, 2e-3, -5.0]);
        problem.weights = vec![1e6, 1e6, 1.0];
        problem.lower = vec![0.0, 0.0, -10.0];
        problem.upper = vec![1.5e-3, 1.5e-3, 10.0];
        problem.scaling = Some(vec![1e3, 1e3, 1.0]);
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::Success);
        assert_relative_eq!(problem.solution[0], 1e-3, epsilon = 1e-8);
        assert_relative_eq!(problem.solution[1], 1.5e-3, epsilon = 1e-12);
        assert_relative_eq!(problem.solution[2], -5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_invalid_scaling() {
        let mut problem = Quadratic::new(vec![1.0, 1.0]);
        problem.scaling = Some(vec![1.0, -2.0]);
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::InvalidProblemDefinition);
        assert_eq!(problem.finalized, 1);

        // ignored when disabled
        problem.finalized = 0;
        let options = SolverOptions {
            variable_scaling: false,
            ..Default::default()
        };
        let summary = LbfgsSolver::new(options).solve(&mut problem);
        assert_eq!(summary.status, SolverStatus::Success);
        assert_eq!(problem.finalized, 1);
    }

    #[test]
    fn test_inequality_constraint() {
        let mut problem = Quadratic::new(vec![2.0, 2.0]);
        problem.weights = vec![1.0, 1.0];
        problem.sum_limit = Some(2.0);
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert!(summary.status.is_success(), "status: {}", summary.status);
        assert_eq!(problem.finalized, 1);
        assert_relative_eq!(problem.solution[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(problem.solution[1], 1.0, epsilon = 1e-4);
        assert!(summary.constraint_violation <= 1e-6);
    }

    #[test]
    fn test_invalid_bounds() {
        let mut problem = Quadratic::new(vec![0.0, 0.0]);
        problem.lower = vec![1.0, 0.0];
        problem.upper = vec![0.0, 1.0];
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::InvalidProblemDefinition);
        assert_eq!(problem.finalized, 1);
        assert_eq!(summary.iterations, 0);
    }

    #[test]
    fn test_invalid_number() {
        let mut problem = Quadratic::new(vec![1.0, 1.0]);
        problem.poison = true;
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::InvalidNumberDetected);
        assert_eq!(problem.finalized, 1);
        assert_eq!(problem.solution, vec![0.0, 0.0]);
    }

    #[test]
    fn test_evaluation_error_keeps_best_iterate() -> Result<(), Box<dyn std::error::Error>> {
        let mut problem = Quadratic::new(vec![1.0, -2.0, 0.5, 3.0]);
        // scaling, start and one accepted step succeed, the next gradient fails
        problem.gradient_budget = Some(3);
        let summary = LbfgsSolver::default().solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::InvalidNumberDetected);
        assert_eq!(problem.finalized, 1);
        assert!(summary.iterations >= 1);

        let f_start = problem.eval_f(&[0.0; 4])?;
        let f_final = problem.eval_f(&problem.solution)?;
        assert!(f_final < f_start, "{f_final} >= {f_start}");
        assert_relative_eq!(summary.obj_value, f_final);
        Ok(())
    }

    #[test]
    fn test_iteration_limit() {
        let mut problem = Quadratic::new(vec![1.0, -2.0, 0.5, 3.0, -4.0]);
        let options = SolverOptions::default().with_max_iter(1);
        let summary = LbfgsSolver::new(options).solve(&mut problem);

        assert_eq!(summary.status, SolverStatus::MaximumIterationsExceeded);
        assert_eq!(summary.iterations, 1);
        assert_eq!(problem.finalized, 1);
    }
}
