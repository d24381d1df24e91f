//! Likelihood ratio test for nested growth models.
//!
//! For a model `m0` nested in `m1` (the free parameters of `m0` are a subset of
//! those of `m1`), with Gaussian errors:
//!
//! ```text
//! Λ = (chisqr1 / chisqr0)^(n/2)
//! D = -2 ln Λ  ~  χ²(k1 - k0)   as n → ∞
//! ```
//!
//! `m1` is preferred when the p-value `P(χ² > D)` is below `alpha`.

use serde::Serialize;
use tracing::warn;

use crate::domain::{FitResult, ModelKind};
use crate::error::AppError;
use crate::math::chi2_sf;

/// Default test significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Outcome of a likelihood ratio test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LrTest {
    pub prefer_m1: bool,
    pub pval: f64,
    /// Test statistic `D`.
    pub stat: f64,
    /// Difference in number of varying parameters.
    pub ddf: usize,
}

/// Compare `m0` (nested) against `m1` (nesting).
pub fn lrtest(m0: &FitResult, m1: &FitResult, alpha: f64) -> Result<LrTest, AppError> {
    let n0 = m0.quality.ndata;
    let n1 = m1.quality.ndata;
    if n0 != n1 {
        return Err(AppError::input(format!(
            "Likelihood ratio test needs fits to the same data (n0={n0}, n1={n1})."
        )));
    }
    let chisqr0 = m0.quality.chisqr;
    let chisqr1 = m1.quality.chisqr;
    if !(chisqr0 > 0.0 && chisqr1 > 0.0) {
        return Err(AppError::numeric(
            "Likelihood ratio test needs positive chisqr on both fits.",
        ));
    }
    let (k0, k1) = (m0.quality.nvarys, m1.quality.nvarys);
    if k1 <= k0 {
        return Err(AppError::input(format!(
            "Likelihood ratio test needs m1 to have more parameters than m0 (k0={k0}, k1={k1})."
        )));
    }
    let ddf = k1 - k0;

    let lambda = (chisqr1 / chisqr0).powf(n0 as f64 / 2.0);
    let stat = -2.0 * lambda.ln();

    // The nesting model did no better: nothing to prefer.
    if !(stat > 0.0) {
        return Ok(LrTest {
            prefer_m1: false,
            pval: 1.0,
            stat: stat.max(0.0),
            ddf,
        });
    }

    let pval = chi2_sf(stat, ddf);
    Ok(LrTest {
        prefer_m1: pval < alpha,
        pval,
        stat,
        ddf,
    })
}

/// Does the data support a lag phase?
///
/// Compares Richards against Baranyi–Roberts, falling back to logistic against
/// Baranyi–Roberts with `nu = 1`. `None` if neither pair was fitted.
pub fn has_lag(fits: &[FitResult], alpha: f64) -> Option<bool> {
    let pairs = [
        (ModelKind::Richards, ModelKind::BaranyiRoberts),
        (ModelKind::Logistic, ModelKind::BaranyiRobertsNu1),
    ];
    test_first_pair(fits, &pairs, alpha)
}

/// Does the data support a curvature `nu != 1`? (logistic vs Richards)
pub fn has_nu(fits: &[FitResult], alpha: f64) -> Option<bool> {
    test_first_pair(fits, &[(ModelKind::Logistic, ModelKind::Richards)], alpha)
}

fn test_first_pair(fits: &[FitResult], pairs: &[(ModelKind, ModelKind)], alpha: f64) -> Option<bool> {
    let find = |kind: ModelKind| fits.iter().find(|f| f.model == kind);
    for &(k0, k1) in pairs {
        let (Some(m0), Some(m1)) = (find(k0), find(k1)) else {
            continue;
        };
        return match lrtest(m0, m1, alpha) {
            Ok(test) => Some(test.prefer_m1),
            Err(e) => {
                warn!(m0 = k0.id(), m1 = k1.id(), "{}", e.message());
                None
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GrowthParams;

    fn fit(model: ModelKind, chisqr: f64, n: usize) -> FitResult {
        let params = GrowthParams {
            y0: 0.1,
            r: 1.0,
            k: 1.0,
            nu: 1.0,
            q0: None,
            v: None,
        };
        FitResult {
            model,
            params,
            init: params,
            errors: Vec::new(),
            quality: crate::fit::fit_quality(n, model.param_count(), chisqr),
            lag: 0.0,
            converged: true,
            iterations: 1,
            t_max: 10.0,
        }
    }

    #[test]
    fn statistic_and_pvalue() {
        let m0 = fit(ModelKind::Logistic, 0.02, 100);
        let m1 = fit(ModelKind::Richards, 0.019, 100);
        let test = lrtest(&m0, &m1, DEFAULT_ALPHA).unwrap();

        let expected = -100.0 * (0.019_f64 / 0.02).ln();
        assert!((test.stat - expected).abs() < 1e-9);
        assert_eq!(test.ddf, 1);
        assert!((test.pval - chi2_sf(expected, 1)).abs() < 1e-12);
        // D ≈ 5.13 > 3.84: the extra parameter is significant.
        assert!(test.prefer_m1);
    }

    #[test]
    fn small_improvement_keeps_nested_model() {
        let m0 = fit(ModelKind::Richards, 0.02, 100);
        let m1 = fit(ModelKind::BaranyiRoberts, 0.0199, 100);
        let test = lrtest(&m0, &m1, DEFAULT_ALPHA).unwrap();
        assert_eq!(test.ddf, 2);
        assert!(!test.prefer_m1);
    }

    #[test]
    fn worse_nesting_model_gives_pvalue_one() {
        let m0 = fit(ModelKind::Logistic, 0.02, 50);
        let m1 = fit(ModelKind::Richards, 0.03, 50);
        let test = lrtest(&m0, &m1, DEFAULT_ALPHA).unwrap();
        assert_eq!(test.pval, 1.0);
        assert!(!test.prefer_m1);
    }

    #[test]
    fn invalid_comparisons_are_errors() {
        let a = fit(ModelKind::Logistic, 0.02, 50);
        let b = fit(ModelKind::Richards, 0.01, 40);
        assert!(lrtest(&a, &b, DEFAULT_ALPHA).is_err());
        let c = fit(ModelKind::Richards, 0.01, 50);
        assert!(lrtest(&c, &a, DEFAULT_ALPHA).is_err());
        let zero = fit(ModelKind::Richards, 0.0, 50);
        assert_eq!(lrtest(&a, &zero, DEFAULT_ALPHA).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn hypothesis_helpers_pick_nested_pairs() {
        let fits = vec![
            fit(ModelKind::BaranyiRoberts, 0.010, 100),
            fit(ModelKind::Richards, 0.020, 100),
            fit(ModelKind::Logistic, 0.0201, 100),
        ];
        assert_eq!(has_lag(&fits, DEFAULT_ALPHA), Some(true));
        assert_eq!(has_nu(&fits, DEFAULT_ALPHA), Some(false));
        assert_eq!(has_nu(&fits[..1], DEFAULT_ALPHA), None);

        let fallback = vec![
            fit(ModelKind::BaranyiRobertsNu1, 0.0199, 100),
            fit(ModelKind::Logistic, 0.020, 100),
        ];
        assert_eq!(has_lag(&fallback, DEFAULT_ALPHA), Some(false));
    }
}
