//! Model selection over the growth model family using BIC.
//!
//! The tool fits each enabled model and computes (lmfit conventions):
//! - chisqr / reduced chisqr
//! - AIC = n ln(chisqr/n) + 2k
//! - BIC = n ln(chisqr/n) + k ln(n)
//!
//! Selection rules:
//! 1. Exclude underdetermined models: require `n >= k + 5`
//! 2. Sort the remaining fits by increasing BIC; the first one is the best

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::domain::{FitOptions, FitResult, GrowthCurve, ModelKind};
use crate::error::AppError;
use crate::fit::fitter::fit_model;

/// Minimum number of extra observations beyond parameter count.
const MIN_N_BUFFER: usize = 5;

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    /// Successful fits, sorted by increasing BIC.
    pub fits: Vec<FitResult>,
    /// Any models that were skipped and why (for diagnostics).
    pub skipped: Vec<(ModelKind, String)>,
}

impl FitSelection {
    /// The fit with the lowest BIC.
    pub fn best(&self) -> &FitResult {
        // `fit_models` never returns an empty selection.
        &self.fits[0]
    }

    pub fn get(&self, kind: ModelKind) -> Option<&FitResult> {
        self.fits.iter().find(|f| f.model == kind)
    }
}

/// Fit every requested model kind and rank the fits by BIC.
pub fn fit_models(curve: &GrowthCurve, kinds: &[ModelKind], opts: &FitOptions) -> Result<FitSelection, AppError> {
    let n = curve.len();
    let mut fits = Vec::new();
    let mut skipped = Vec::new();

    for &kind in kinds {
        let k = kind.param_count();
        if n < k + MIN_N_BUFFER {
            skipped.push((
                kind,
                format!("Underdetermined: n={n} < k+{MIN_N_BUFFER}={}", k + MIN_N_BUFFER),
            ));
            continue;
        }

        match fit_model(kind, curve, opts) {
            Ok(fit) => {
                if !fit.converged {
                    warn!(model = kind.id(), iterations = fit.iterations, "fit did not converge");
                }
                debug!(model = kind.id(), bic = fit.quality.bic, chisqr = fit.quality.chisqr, "model fitted");
                fits.push(fit);
            }
            Err(e) => skipped.push((kind, e.message().to_string())),
        }
    }

    if fits.is_empty() {
        return Err(AppError::data(
            "Insufficient data to fit any model after guardrails.",
        ));
    }

    sort_by_bic(&mut fits);
    Ok(FitSelection { fits, skipped })
}

/// Stable sort by increasing BIC (ties keep the fit order).
pub fn sort_by_bic(fits: &mut [FitResult]) {
    fits.sort_by(|a, b| {
        a.quality
            .bic
            .partial_cmp(&b.quality.bic)
            .unwrap_or(Ordering::Equal)
    });
}
