//! Quantities derived from a fitted growth curve.
//!
//! Both helpers sample the fitted model on a dense uniform grid over
//! `[0, t_max]` and use the analytic ODE right-hand side for `dy/dt`.

use serde::Serialize;

use crate::domain::FitResult;
use crate::error::AppError;
use crate::math::{argmax, linspace};
use crate::models::{growth_rate, predict};

/// Number of grid points used to scan a fitted curve.
pub const SCAN_POINTS: usize = 1000;

/// Location of the maximal absolute and specific growth rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaxGrowth {
    /// Time of maximal `dy/dt`.
    pub t1: f64,
    pub y1: f64,
    /// Maximal `dy/dt`.
    pub a: f64,
    /// Time of maximal `(dy/dt)/y`.
    pub t2: f64,
    pub y2: f64,
    /// Maximal specific growth rate `(dy/dt)/y`.
    pub mu: f64,
}

/// Tangent-line lag estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LagEstimate {
    pub lag: f64,
    /// Tangent slope at the inflection point.
    pub slope: f64,
    pub t1: f64,
    pub y1: f64,
}

struct Scan {
    t: Vec<f64>,
    y: Vec<f64>,
    dy: Vec<f64>,
}

fn scan(fit: &FitResult) -> Result<Scan, AppError> {
    if !(fit.t_max.is_finite() && fit.t_max > 0.0) {
        return Err(AppError::data("Fit has no positive time span to scan."));
    }
    let t = linspace(0.0, fit.t_max, SCAN_POINTS);
    let y: Vec<f64> = t.iter().map(|&ti| predict(fit.model, ti, &fit.params)).collect();
    let dy = t
        .iter()
        .zip(&y)
        .map(|(&ti, &yi)| growth_rate(fit.model, ti, yi, &fit.params))
        .collect();
    Ok(Scan { t, y, dy })
}

/// Find the maximal growth rate and maximal specific growth rate of a fit.
pub fn find_max_growth(fit: &FitResult) -> Result<MaxGrowth, AppError> {
    let s = scan(fit)?;
    let i = argmax(&s.dy).ok_or_else(|| AppError::numeric("Growth rate is not finite on the fit grid."))?;

    let specific: Vec<f64> = s
        .dy
        .iter()
        .zip(&s.y)
        .map(|(&d, &y)| if y > 0.0 { d / y } else { f64::NAN })
        .collect();
    let j = argmax(&specific)
        .ok_or_else(|| AppError::numeric("Specific growth rate is not finite on the fit grid."))?;

    Ok(MaxGrowth {
        t1: s.t[i],
        y1: s.y[i],
        a: s.dy[i],
        t2: s.t[j],
        y2: s.y[j],
        mu: specific[j],
    })
}

/// Lag duration from the tangent at the point of maximal growth rate.
///
/// The tangent `y = a t + b` through `(t1, y1)` meets the fitted `y0` at
/// `λ = (y0 - b) / a`.
pub fn find_lag(fit: &FitResult) -> Result<LagEstimate, AppError> {
    let s = scan(fit)?;
    let i = argmax(&s.dy).ok_or_else(|| AppError::numeric("Growth rate is not finite on the fit grid."))?;
    let (a, t1, y1) = (s.dy[i], s.t[i], s.y[i]);
    if !(a > 0.0) {
        return Err(AppError::numeric("Fitted curve never grows; lag is undefined."));
    }
    let b = y1 - a * t1;
    Ok(LagEstimate {
        lag: (fit.params.y0 - b) / a,
        slope: a,
        t1,
        y1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GrowthParams, ModelKind};
    use crate::fit::fit_quality;

    fn fit(model: ModelKind, params: GrowthParams, t_max: f64) -> FitResult {
        FitResult {
            model,
            params,
            init: params,
            errors: Vec::new(),
            quality: fit_quality(50, model.param_count(), 0.01),
            lag: crate::models::lag_duration(model, &params),
            converged: true,
            iterations: 1,
            t_max,
        }
    }

    fn logistic() -> FitResult {
        let p = GrowthParams {
            y0: 0.01,
            r: 1.0,
            k: 1.0,
            nu: 1.0,
            q0: None,
            v: None,
        };
        fit(ModelKind::Logistic, p, 20.0)
    }

    #[test]
    fn logistic_max_growth_is_at_half_capacity() {
        let m = find_max_growth(&logistic()).unwrap();
        // Logistic inflection: y = K/2, dy/dt = rK/4, at t = ln(K/y0 - 1)/r.
        let t_inflection = (99.0_f64).ln();
        assert!((m.t1 - t_inflection).abs() < 0.05, "t1 {}", m.t1);
        assert!((m.y1 - 0.5).abs() < 0.01);
        assert!((m.a - 0.25).abs() < 1e-3);
        // Specific growth peaks at the start for the logistic.
        assert_eq!(m.t2, 0.0);
        assert!((m.mu - 0.99).abs() < 1e-9);
    }

    #[test]
    fn logistic_tangent_lag() {
        let est = find_lag(&logistic()).unwrap();
        let t1 = (99.0_f64).ln();
        let expected = t1 - (0.5 - 0.01) / 0.25;
        assert!((est.lag - expected).abs() < 0.05, "lag {}", est.lag);
    }

    #[test]
    fn lag_model_has_longer_tangent_lag() {
        let base = logistic();
        let p = GrowthParams {
            q0: Some(0.05),
            v: Some(1.0),
            ..base.params
        };
        let lagged = fit(ModelKind::BaranyiRobertsNu1, p, 30.0);
        let with_lag = find_lag(&lagged).unwrap().lag;
        let without = find_lag(&base).unwrap().lag;
        assert!(with_lag > without + 1.0, "{with_lag} vs {without}");
    }

    #[test]
    fn flat_curve_has_no_lag() {
        let p = GrowthParams {
            y0: 1.0,
            r: 1.0,
            k: 1.0,
            nu: 1.0,
            q0: None,
            v: None,
        };
        let flat = fit(ModelKind::Logistic, p, 10.0);
        assert_eq!(find_lag(&flat).unwrap_err().exit_code(), 4);
    }
}
