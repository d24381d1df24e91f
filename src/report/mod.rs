//! Reporting utilities: residuals of a fit and terminal formatting.

use crate::domain::{FitResult, GrowthCurve};
use crate::error::AppError;
use crate::models::predict;

pub mod format;

pub use format::*;

/// Observed vs fitted value at one time point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub time: f64,
    pub y_obs: f64,
    pub y_fit: f64,
    pub residual: f64,
}

/// Fitted values and residuals at every time point of the curve.
pub fn compute_residuals(curve: &GrowthCurve, fit: &FitResult) -> Result<Vec<Residual>, AppError> {
    let mut out = Vec::with_capacity(curve.len());
    for (&t, &y_obs) in curve.time.iter().zip(&curve.value) {
        let y_fit = predict(fit.model, t, &fit.params);
        if !y_fit.is_finite() {
            return Err(AppError::numeric(format!(
                "Non-finite model prediction at t={t:.3} h during residual computation."
            )));
        }
        out.push(Residual {
            time: t,
            y_obs,
            y_fit,
            residual: y_obs - y_fit,
        });
    }
    Ok(out)
}

/// The `top_n` residuals with the largest magnitude, largest first.
pub fn largest_residuals(residuals: &[Residual], top_n: usize) -> Vec<Residual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| {
        b.residual
            .abs()
            .partial_cmp(&a.residual.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}

/// Root mean square of the residuals (0 for an empty slice).
pub fn rmse(residuals: &[Residual]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let ss: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
    (ss / residuals.len() as f64).sqrt()
}
