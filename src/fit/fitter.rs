//! Low-level fitting routines for a single model kind.
//!
//! Given:
//! - times `t_i`
//! - observed values `y_i`
//! - optional weights `w_i` (`1/std` over replicates)
//! - a list of starting points
//!
//! we run, for each start, a bounded Levenberg–Marquardt minimization of
//!
//! ```text
//! chisqr = Σ (w_i (y_i - f(t_i; θ)))²
//! ```
//!
//! and return the best (lowest chisqr) converged candidate.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{
    FitOptions, FitQuality, FitResult, GrowthCurve, GrowthParams, ModelKind, ParamError, ParamName,
};
use crate::error::AppError;
use crate::fit::guess::{initial_guess, start_grid};
use crate::math::{normal_inverse, solve_damped};
use crate::models::{lag_duration, predict};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;
/// Relative finite-difference step (≈ cube root of machine epsilon).
const FD_REL_STEP: f64 = 6e-6;

/// Observations for one fit, borrowed from a `GrowthCurve`.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub model: ModelKind,
    pub time: &'a [f64],
    pub y: &'a [f64],
    pub weights: Option<&'a [f64]>,
}

impl Problem<'_> {
    fn weight(&self, i: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[i])
    }

    /// Weighted residuals `w_i (y_i - f_i)`.
    fn residuals(&self, params: &GrowthParams) -> DVector<f64> {
        DVector::from_iterator(
            self.time.len(),
            self.time
                .iter()
                .zip(self.y)
                .enumerate()
                .map(|(i, (&t, &y))| self.weight(i) * (y - predict(self.model, t, params))),
        )
    }

    /// Weighted model Jacobian `w_i ∂f(t_i)/∂θ_j` by finite differences.
    fn jacobian(&self, theta: &[f64], base: &GrowthParams) -> DMatrix<f64> {
        let free = self.model.free_params();
        let n = self.time.len();
        let mut jac = DMatrix::<f64>::zeros(n, free.len());

        for (j, &name) in free.iter().enumerate() {
            let (lo, hi) = name.bounds();
            let h = FD_REL_STEP * theta[j].abs().max(1e-8);
            let (minus, plus) = if theta[j] - h >= lo && theta[j] + h <= hi {
                (theta[j] - h, theta[j] + h)
            } else if theta[j] + h <= hi {
                (theta[j], theta[j] + h)
            } else {
                (theta[j] - h, theta[j])
            };

            let mut p_minus = *base;
            p_minus.set(name, minus);
            let mut p_plus = *base;
            p_plus.set(name, plus);
            let span = plus - minus;

            for i in 0..n {
                let t = self.time[i];
                let df = predict(self.model, t, &p_plus) - predict(self.model, t, &p_minus);
                jac[(i, j)] = self.weight(i) * df / span;
            }
        }
        jac
    }
}

/// Result of one Levenberg–Marquardt run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: GrowthParams,
    pub chisqr: f64,
    pub jacobian: DMatrix<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Fit a single model kind to a growth curve.
pub fn fit_model(kind: ModelKind, curve: &GrowthCurve, opts: &FitOptions) -> Result<FitResult, AppError> {
    let guess = initial_guess(curve)?;
    let weights = curve.weights();
    let problem = Problem {
        model: kind,
        time: &curve.time,
        y: &curve.value,
        weights: weights.as_deref(),
    };
    let starts = start_grid(kind, &guess, opts.multi_start);
    fit_problem(&problem, &starts, opts)
}

/// Fit a problem from several starting points (parallel) and keep the best.
pub fn fit_problem(
    problem: &Problem<'_>,
    starts: &[GrowthParams],
    opts: &FitOptions,
) -> Result<FitResult, AppError> {
    let n = problem.time.len();
    let k = problem.model.param_count();
    if n <= k {
        return Err(AppError::data(format!(
            "Underdetermined fit for {}: n={n} <= k={k}.",
            problem.model.display_name()
        )));
    }
    if starts.is_empty() {
        return Err(AppError::numeric("No starting points to fit."));
    }

    let outcomes: Vec<(usize, LmOutcome)> = starts
        .par_iter()
        .enumerate()
        .filter_map(|(idx, start)| levenberg_marquardt(problem, start, opts).map(|o| (idx, o)))
        .collect();

    // Deterministic selection: minimum chisqr; ties go to the earlier start.
    let mut best: Option<&(usize, LmOutcome)> = None;
    for c in &outcomes {
        best = match best {
            Some(b) if b.1.chisqr < c.1.chisqr || (b.1.chisqr == c.1.chisqr && b.0 < c.0) => Some(b),
            _ => Some(c),
        };
    }
    let Some((idx, best)) = best else {
        return Err(AppError::numeric(format!(
            "No valid fit candidates for model {}.",
            problem.model.display_name()
        )));
    };

    debug!(
        model = problem.model.id(),
        start = *idx,
        starts = starts.len(),
        chisqr = best.chisqr,
        iterations = best.iterations,
        "fit converged"
    );

    Ok(to_fit_result(problem, &starts[*idx], best))
}

/// Bounded Levenberg–Marquardt from a single start.
///
/// Returns `None` if the start (or every step from it) is non-finite.
pub fn levenberg_marquardt(problem: &Problem<'_>, start: &GrowthParams, opts: &FitOptions) -> Option<LmOutcome> {
    let free = problem.model.free_params();
    let mut params = *start;
    let mut theta: Vec<f64> = free
        .iter()
        .map(|&name| clamp_param(name, params.get(name).unwrap_or(1.0)))
        .collect();
    for (&name, &value) in free.iter().zip(&theta) {
        params.set(name, value);
    }

    let mut resid = problem.residuals(&params);
    let mut chisqr = resid.norm_squared();
    if !chisqr.is_finite() {
        return None;
    }
    let mut jac = problem.jacobian(&theta, &params);

    let mut lambda = LAMBDA_INIT;
    let mut converged = false;
    let mut iterations = 0;

    'outer: while iterations < opts.max_iter {
        iterations += 1;
        if chisqr == 0.0 {
            converged = true;
            break;
        }

        let scale: Vec<f64> = jac.column_iter().map(|c| c.norm()).collect();
        loop {
            let Some(delta) = solve_damped(&jac, &resid, lambda, &scale) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    converged = true;
                    break 'outer;
                }
                continue;
            };

            let trial_theta: Vec<f64> = free
                .iter()
                .zip(&theta)
                .zip(delta.iter())
                .map(|((&name, &x), &d)| clamp_param(name, x + d))
                .collect();
            let mut trial = params;
            for (&name, &value) in free.iter().zip(&trial_theta) {
                trial.set(name, value);
            }
            let trial_resid = problem.residuals(&trial);
            let trial_chisqr = trial_resid.norm_squared();

            if trial_chisqr.is_finite() && trial_chisqr < chisqr {
                let improvement = (chisqr - trial_chisqr) / chisqr;
                let step = trial_theta
                    .iter()
                    .zip(&theta)
                    .map(|(a, b)| (a - b).abs() / b.abs().max(1e-12))
                    .fold(0.0, f64::max);

                theta = trial_theta;
                params = trial;
                resid = trial_resid;
                chisqr = trial_chisqr;
                jac = problem.jacobian(&theta, &params);
                lambda = (lambda / 10.0).max(1e-12);

                if improvement < opts.tol || step < 1e-12 {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No downhill step left: a (local) minimum.
                converged = true;
                break 'outer;
            }
        }
    }

    Some(LmOutcome {
        params,
        chisqr,
        jacobian: jac,
        iterations,
        converged,
    })
}

fn clamp_param(name: ParamName, value: f64) -> f64 {
    let (lo, hi) = name.bounds();
    if value.is_nan() { lo } else { value.clamp(lo, hi) }
}

fn to_fit_result(problem: &Problem<'_>, start: &GrowthParams, outcome: &LmOutcome) -> FitResult {
    let n = problem.time.len();
    let k = problem.model.param_count();
    let quality = fit_quality(n, k, outcome.chisqr);

    let covariance = normal_inverse(&outcome.jacobian);
    let errors = problem
        .model
        .free_params()
        .iter()
        .enumerate()
        .map(|(j, &name)| ParamError {
            name,
            stderr: covariance.as_ref().and_then(|cov| {
                let var = cov[(j, j)] * quality.redchi;
                (var.is_finite() && var >= 0.0).then(|| var.sqrt())
            }),
        })
        .collect();

    FitResult {
        model: problem.model,
        params: outcome.params,
        init: *start,
        errors,
        quality,
        lag: lag_duration(problem.model, &outcome.params),
        converged: outcome.converged,
        iterations: outcome.iterations,
        t_max: problem.time.iter().copied().fold(0.0, f64::max),
    }
}

/// Information criteria following lmfit:
/// `aic = n ln(chisqr/n) + 2k`, `bic = n ln(chisqr/n) + k ln(n)`.
pub fn fit_quality(n: usize, k: usize, chisqr: f64) -> FitQuality {
    let n_f = n as f64;
    let k_f = k as f64;
    let log_like = n_f * (chisqr / n_f).max(f64::MIN_POSITIVE).ln();
    let dof = n.saturating_sub(k).max(1) as f64;
    FitQuality {
        ndata: n,
        nvarys: k,
        chisqr,
        redchi: chisqr / dof,
        aic: log_like + 2.0 * k_f,
        bic: log_like + k_f * n_f.ln(),
    }
}
