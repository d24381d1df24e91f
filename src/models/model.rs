//! Model evaluation for the logistic / Richards / Baranyi–Roberts family.
//!
//! Every model is a special case of the Richards curve evaluated at an
//! "effective time" `A(t)`:
//!
//! ```text
//! y(t) = K / [1 - (1 - (K/y0)^nu) exp(-r nu A(t))]^(1/nu)
//! ```
//!
//! - Richards / logistic: `A(t) = t` (logistic fixes `nu = 1`)
//! - Baranyi–Roberts: `A(t) = t + (1/v) ln((exp(-v t) + q0) / (1 + q0))`
//!
//! The fitter relies on `predict`; the competition simulator relies on the
//! ODE right-hand side `growth_rate`.

use crate::domain::{GrowthParams, ModelKind};

/// Richards growth curve (generalized logistic).
pub fn richards(t: f64, y0: f64, r: f64, k: f64, nu: f64) -> f64 {
    richards_at(t, y0, r, k, nu)
}

/// Logistic growth curve.
pub fn logistic(t: f64, y0: f64, r: f64, k: f64) -> f64 {
    richards_at(t, y0, r, k, 1.0)
}

/// Baranyi–Roberts growth curve: Richards with an adjustment (lag) phase.
pub fn baranyi_roberts(t: f64, y0: f64, r: f64, k: f64, nu: f64, q0: f64, v: f64) -> f64 {
    richards_at(adjusted_time(t, q0, v), y0, r, k, nu)
}

/// `A(t) = ∫₀ᵗ α(s) ds` for `α(s) = q0 / (q0 + exp(-v s))`.
pub fn adjusted_time(t: f64, q0: f64, v: f64) -> f64 {
    t + (((-v * t).exp() + q0).ln() - q0.ln_1p()) / v
}

fn richards_at(a: f64, y0: f64, r: f64, k: f64, nu: f64) -> f64 {
    let base = 1.0 - (1.0 - (k / y0).powf(nu)) * (-r * nu * a).exp();
    k / base.powf(1.0 / nu)
}

/// `(q0, v)` actually used by a lag model (`v = r` for the simplified model).
pub fn lag_params(model: ModelKind, params: &GrowthParams) -> Option<(f64, f64)> {
    match model {
        ModelKind::Logistic | ModelKind::Richards => None,
        ModelKind::SimplifiedBaranyiRoberts => params.q0.map(|q0| (q0, params.r)),
        ModelKind::BaranyiRobertsNu1 | ModelKind::BaranyiRoberts => params.q0.zip(params.v),
    }
}

/// Curvature actually used by the model.
pub fn effective_nu(model: ModelKind, params: &GrowthParams) -> f64 {
    match model {
        ModelKind::Richards | ModelKind::BaranyiRoberts => params.nu,
        _ => 1.0,
    }
}

/// Predict `y(t)` for the given model kind.
pub fn predict(model: ModelKind, t: f64, params: &GrowthParams) -> f64 {
    let nu = effective_nu(model, params);
    match lag_params(model, params) {
        Some((q0, v)) => baranyi_roberts(t, params.y0, params.r, params.k, nu, q0, v),
        None => richards(t, params.y0, params.r, params.k, nu),
    }
}

/// Predict the model on a set of times.
pub fn predict_many(model: ModelKind, times: &[f64], params: &GrowthParams) -> Vec<f64> {
    times.iter().map(|&t| predict(model, t, params)).collect()
}

/// Physiological adjustment `α(t) = q0 / (q0 + exp(-v t))` (1 without lag).
pub fn adjustment(model: ModelKind, t: f64, params: &GrowthParams) -> f64 {
    match lag_params(model, params) {
        Some((q0, v)) => q0 / (q0 + (-v * t).exp()),
        None => 1.0,
    }
}

/// ODE right-hand side: `dy/dt = r α(t) y (1 - (y/K)^nu)`.
pub fn growth_rate(model: ModelKind, t: f64, y: f64, params: &GrowthParams) -> f64 {
    let nu = effective_nu(model, params);
    params.r * adjustment(model, t, params) * y * (1.0 - (y / params.k).powf(nu))
}

/// Lag duration implied by the parameters: `λ = ln(1 + 1/q0) / v`.
pub fn lag_duration(model: ModelKind, params: &GrowthParams) -> f64 {
    match lag_params(model, params) {
        Some((q0, v)) => (1.0 / q0).ln_1p() / v,
        None => 0.0,
    }
}
