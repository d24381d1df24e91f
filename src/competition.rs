//! Pairwise competition simulation and relative fitness.
//!
//! Two fitted strains share one well. Each follows its own Baranyi–Roberts
//! ODE, but the density-dependent term sees the total population:
//!
//! ```text
//! dN_i/dt = r_i α_i(t) N_i (1 - ((N_a + N_b) / K_i)^nu_i)
//! ```
//!
//! Both strains start at half their fitted `y0`, so the mixed culture starts
//! from the same total density as a monoculture.

use serde::Serialize;
use tracing::debug;

use crate::domain::FitResult;
use crate::error::AppError;
use crate::models::{adjustment, effective_nu};

/// Integration steps per output sample.
const SUBSTEPS: usize = 10;

/// Simulated densities of the two competing strains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competition {
    pub time: Vec<f64>,
    /// `[assay, reference]` densities at each time.
    pub y: Vec<[f64; 2]>,
}

impl Competition {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

fn rhs(fits: [&FitResult; 2], t: f64, n: [f64; 2]) -> [f64; 2] {
    let total = n[0] + n[1];
    let mut out = [0.0; 2];
    for (i, fit) in fits.iter().enumerate() {
        let p = &fit.params;
        let nu = effective_nu(fit.model, p);
        out[i] = p.r * adjustment(fit.model, t, p) * n[i] * (1.0 - (total / p.k).powf(nu));
    }
    out
}

fn axpy(y: [f64; 2], h: f64, k: [f64; 2]) -> [f64; 2] {
    [y[0] + h * k[0], y[1] + h * k[1]]
}

fn rk4_step(fits: [&FitResult; 2], t: f64, y: [f64; 2], h: f64) -> [f64; 2] {
    let k1 = rhs(fits, t, y);
    let k2 = rhs(fits, t + h / 2.0, axpy(y, h / 2.0, k1));
    let k3 = rhs(fits, t + h / 2.0, axpy(y, h / 2.0, k2));
    let k4 = rhs(fits, t + h, axpy(y, h, k3));
    [
        y[0] + h / 6.0 * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]),
        y[1] + h / 6.0 * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]),
    ]
}

/// Simulate `assay` competing with `reference` for `hours`, sampled at
/// `steps` uniformly spaced times (both ends included).
pub fn compete(assay: &FitResult, reference: &FitResult, hours: f64, steps: usize) -> Result<Competition, AppError> {
    if !(hours.is_finite() && hours > 0.0) {
        return Err(AppError::input(format!("Competition needs a positive duration, got {hours}.")));
    }
    if steps < 2 {
        return Err(AppError::input("Competition needs at least two time steps."));
    }

    let fits = [assay, reference];
    let dt = hours / (steps - 1) as f64;
    let h = dt / SUBSTEPS as f64;

    let mut y = [assay.params.y0 / 2.0, reference.params.y0 / 2.0];
    let mut time = Vec::with_capacity(steps);
    let mut out = Vec::with_capacity(steps);
    time.push(0.0);
    out.push(y);

    for step in 1..steps {
        let t0 = (step - 1) as f64 * dt;
        for sub in 0..SUBSTEPS {
            y = rk4_step(fits, t0 + sub as f64 * h, y, h);
        }
        let t = hours * step as f64 / (steps - 1) as f64;
        if !(y[0].is_finite() && y[1].is_finite()) {
            return Err(AppError::numeric(format!("Competition diverged at t={t:.3} h.")));
        }
        time.push(t);
        out.push(y);
    }

    debug!(hours, steps, end_assay = y[0], end_reference = y[1], "competition simulated");
    Ok(Competition { time, y: out })
}

/// Relative fitness as in Lenski's long-term evolution experiment:
/// `w = ln(A_end / A_0) / ln(B_end / B_0)`.
pub fn fitness_ltee(comp: &Competition, assay: usize, reference: usize) -> Result<f64, AppError> {
    if assay > 1 || reference > 1 {
        return Err(AppError::input("Competition strains are indexed 0 and 1."));
    }
    let (Some(first), Some(last)) = (comp.y.first(), comp.y.last()) else {
        return Err(AppError::data("Competition has no samples."));
    };
    let growth = |i: usize| (last[i] / first[i]).ln();
    let w = growth(assay) / growth(reference);
    if !w.is_finite() {
        return Err(AppError::numeric("Relative fitness is undefined: reference did not grow."));
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GrowthParams, ModelKind};
    use crate::fit::fit_quality;

    fn fit(model: ModelKind, r: f64, q0: Option<f64>, v: Option<f64>) -> FitResult {
        let params = GrowthParams {
            y0: 0.02,
            r,
            k: 1.0,
            nu: 1.0,
            q0,
            v,
        };
        FitResult {
            model,
            params,
            init: params,
            errors: Vec::new(),
            quality: fit_quality(50, model.param_count(), 0.01),
            lag: 0.0,
            converged: true,
            iterations: 1,
            t_max: 24.0,
        }
    }

    #[test]
    fn identical_strains_have_unit_fitness() {
        let a = fit(ModelKind::Logistic, 1.0, None, None);
        let comp = compete(&a, &a, 24.0, 100).unwrap();
        assert_eq!(comp.len(), 100);
        assert_eq!(comp.time[99], 24.0);

        let end = comp.y[99];
        assert!((end[0] - end[1]).abs() < 1e-12);
        // Together the strains saturate at the shared capacity.
        assert!((end[0] + end[1] - 1.0).abs() < 1e-3);
        assert!((fitness_ltee(&comp, 0, 1).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mixed_logistic_matches_monoculture_total() {
        let a = fit(ModelKind::Logistic, 1.0, None, None);
        let comp = compete(&a, &a, 10.0, 11).unwrap();
        for (t, y) in comp.time.iter().zip(&comp.y) {
            let mono = crate::models::logistic(*t, 0.02, 1.0, 1.0);
            assert!((y[0] + y[1] - mono).abs() < 1e-5, "t={t}");
        }
    }

    #[test]
    fn faster_strain_wins() {
        let fast = fit(ModelKind::Logistic, 1.2, None, None);
        let slow = fit(ModelKind::Logistic, 0.8, None, None);
        let comp = compete(&fast, &slow, 24.0, 50).unwrap();
        assert!(fitness_ltee(&comp, 0, 1).unwrap() > 1.0);
        assert!(fitness_ltee(&comp, 1, 0).unwrap() < 1.0);
    }

    #[test]
    fn lag_costs_fitness() {
        let lagged = fit(ModelKind::BaranyiRobertsNu1, 1.0, Some(0.05), Some(1.0));
        let plain = fit(ModelKind::Logistic, 1.0, None, None);
        let comp = compete(&lagged, &plain, 24.0, 50).unwrap();
        assert!(fitness_ltee(&comp, 0, 1).unwrap() < 1.0);
    }

    #[test]
    fn rejects_bad_arguments() {
        let a = fit(ModelKind::Logistic, 1.0, None, None);
        assert_eq!(compete(&a, &a, 0.0, 10).unwrap_err().exit_code(), 2);
        assert_eq!(compete(&a, &a, 5.0, 1).unwrap_err().exit_code(), 2);
        let comp = compete(&a, &a, 5.0, 5).unwrap();
        assert!(fitness_ltee(&comp, 0, 2).is_err());
    }
}
