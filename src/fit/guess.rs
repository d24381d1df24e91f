//! Initial guesses and the multi-start grid.
//!
//! Guesses come straight from the data:
//!
//! - `K`  = largest observed value
//! - `y0` = smallest observed value
//! - `r`  = `4 · max(dy/dt) / K` (the logistic's maximal slope is `rK/4`)
//! - `nu = 1`, `q0 = 0.1`, `v = 1`
//!
//! Nonlinear least squares on growth models has local minima (mostly along
//! the `q0`/`v` ridge), so besides the guess we also try a small,
//! deterministic grid of perturbed starts.

use crate::domain::{GrowthCurve, GrowthParams, ModelKind, PARAM_MIN, ParamName};
use crate::error::AppError;
use crate::math::gradient;

const NU_GUESS: f64 = 1.0;
const Q0_GUESS: f64 = 0.1;
const V_GUESS: f64 = 1.0;

/// Multipliers applied to the `r` guess.
const R_SCALES: [f64; 3] = [1.0, 0.5, 2.0];
/// Alternative `q0` starts for lag models.
const Q0_STARTS: [f64; 2] = [Q0_GUESS, 0.5];

/// Data-driven guess covering every parameter of the family.
pub fn initial_guess(curve: &GrowthCurve) -> Result<GrowthParams, AppError> {
    if curve.len() < 2 {
        return Err(AppError::data("Need at least two time points to guess parameters."));
    }

    let k = curve.value.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let y0 = curve.value.iter().copied().fold(f64::INFINITY, f64::min);
    if !(k.is_finite() && y0.is_finite()) || k <= 0.0 {
        return Err(AppError::data("Growth curve has no positive finite values."));
    }

    let slopes = gradient(&curve.value, &curve.time);
    let max_slope = slopes
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let r = 4.0 * max_slope / k;
    let r = if r.is_finite() && r > 0.0 { r } else { 1.0 };

    Ok(GrowthParams {
        y0: y0.max(PARAM_MIN),
        r,
        k,
        nu: NU_GUESS,
        q0: Some(Q0_GUESS),
        v: Some(V_GUESS),
    })
}

/// Restrict a full guess to the parameters a model actually carries.
pub fn start_for(kind: ModelKind, guess: &GrowthParams) -> GrowthParams {
    let mut p = *guess;
    if !kind.free_params().contains(&ParamName::Nu) {
        p.nu = 1.0;
    }
    if !kind.has_lag() {
        p.q0 = None;
        p.v = None;
    } else {
        p.q0 = Some(p.q0.unwrap_or(Q0_GUESS));
        p.v = if kind.free_params().contains(&ParamName::V) {
            Some(p.v.unwrap_or(V_GUESS))
        } else {
            None
        };
    }
    p
}

/// Starting points for `kind`. The first entry is always the plain guess.
pub fn start_grid(kind: ModelKind, guess: &GrowthParams, multi_start: bool) -> Vec<GrowthParams> {
    let base = start_for(kind, guess);
    if !multi_start {
        return vec![base];
    }

    let free = kind.free_params();
    let q0_starts: &[f64] = if free.contains(&ParamName::Q0) {
        &Q0_STARTS
    } else {
        &[f64::NAN]
    };
    let v_starts: Vec<f64> = if free.contains(&ParamName::V) {
        let mut v = vec![base.v.unwrap_or(V_GUESS)];
        if (base.r - v[0]).abs() > 1e-9 {
            v.push(base.r);
        }
        v
    } else {
        vec![f64::NAN]
    };

    let mut out = Vec::new();
    for &scale in &R_SCALES {
        for &q0 in q0_starts {
            for &v in &v_starts {
                let mut p = base;
                p.r = base.r * scale;
                if q0.is_finite() {
                    p.q0 = Some(q0);
                }
                if v.is_finite() {
                    p.v = Some(v);
                }
                out.push(p);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logistic;

    fn logistic_curve() -> GrowthCurve {
        GrowthCurve::from_pairs((0..30).map(|i| {
            let t = i as f64 * 0.5;
            (t, logistic(t, 0.05, 1.0, 0.9))
        }))
    }

    #[test]
    fn guess_matches_data_extremes() {
        let g = initial_guess(&logistic_curve()).unwrap();
        assert!((g.y0 - 0.05).abs() < 1e-12);
        assert!(g.k < 0.9 && g.k > 0.85);
        // Logistic max slope is rK/4, so the guess should recover r≈1.
        assert!((g.r - 1.0).abs() < 0.15, "r guess {}", g.r);
        assert_eq!(g.q0, Some(0.1));
    }

    #[test]
    fn guess_rejects_tiny_curves() {
        let curve = GrowthCurve::from_pairs(vec![(0.0, 0.1)]);
        assert_eq!(initial_guess(&curve).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn start_grid_respects_model_parameters() {
        let g = initial_guess(&logistic_curve()).unwrap();

        let logistic_starts = start_grid(ModelKind::Logistic, &g, true);
        assert_eq!(logistic_starts.len(), R_SCALES.len());
        assert!(logistic_starts.iter().all(|p| p.q0.is_none() && p.nu == 1.0));

        let br = start_grid(ModelKind::BaranyiRoberts, &g, true);
        assert_eq!(br[0], start_for(ModelKind::BaranyiRoberts, &g));
        assert!(br.iter().all(|p| p.q0.is_some() && p.v.is_some()));
        assert!(br.len() > logistic_starts.len());

        let simplified = start_grid(ModelKind::SimplifiedBaranyiRoberts, &g, true);
        assert!(simplified.iter().all(|p| p.v.is_none()));

        assert_eq!(start_grid(ModelKind::Richards, &g, false).len(), 1);
    }
}
