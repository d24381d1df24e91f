//! Formatted terminal output: fit reports, model diagnostics, result tables.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (snapshot tests below)

use crate::domain::{FitResult, GrowthCurve, ParamName, StrainResult};
use crate::fit::{FitSelection, LagEstimate, MaxGrowth};
use crate::models::lag_params;
use crate::report::Residual;

/// lmfit-style report of a single fit.
pub fn format_fit_report(fit: &FitResult) -> String {
    let q = &fit.quality;
    let mut out = String::new();

    out.push_str("[[Model]]\n");
    out.push_str(&format!("    {}\n", fit.model.display_name()));
    out.push_str("[[Fit Statistics]]\n");
    out.push_str(&format!("    # iterations       = {}\n", fit.iterations));
    out.push_str(&format!("    # data points      = {}\n", q.ndata));
    out.push_str(&format!("    # variables        = {}\n", q.nvarys));
    out.push_str(&format!("    chi-square         = {}\n", fmt_g(q.chisqr)));
    out.push_str(&format!("    reduced chi-square = {}\n", fmt_g(q.redchi)));
    out.push_str(&format!("    Akaike info crit   = {:.5}\n", q.aic));
    out.push_str(&format!("    Bayesian info crit = {:.5}\n", q.bic));
    if !fit.converged {
        out.push_str("    ## Warning: fit did not converge\n");
    }
    out.push_str("[[Variables]]\n");

    for &name in fit.model.free_params() {
        let Some(value) = fit.params.get(name) else {
            continue;
        };
        let init = fit.init.get(name).map(fmt_g).unwrap_or_default();
        let err = match fit.stderr(name) {
            Some(se) if value != 0.0 => {
                format!(" +/- {} ({:.2}%)", fmt_g(se), (se / value).abs() * 100.0)
            }
            Some(se) => format!(" +/- {}", fmt_g(se)),
            None => String::new(),
        };
        out.push_str(&format!(
            "    {:<4}{}{err} (init = {init})\n",
            format!("{}:", name.as_str()),
            fmt_g(value)
        ));
    }
    // Parameters the model pins rather than estimates.
    if !fit.model.free_params().contains(&ParamName::Nu) {
        out.push_str("    nu: 1 (fixed)\n");
    }
    if fit.model.has_lag() && !fit.model.free_params().contains(&ParamName::V) {
        if let Some((_, v)) = lag_params(fit.model, &fit.params) {
            out.push_str(&format!("    v:  {} (== r)\n", fmt_g(v)));
        }
    }

    out
}

/// Diagnostics of every fitted model, best first (`*`).
pub fn format_model_diagnostics(selection: &FitSelection) -> String {
    let mut out = String::new();
    out.push_str("Model diagnostics:\n");
    for (i, fit) in selection.fits.iter().enumerate() {
        let chosen = if i == 0 { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} {:<28} chisqr={:<12} AIC={:<12.3} BIC={:.3}\n",
            fit.model.display_name(),
            fmt_g(fit.quality.chisqr),
            fit.quality.aic,
            fit.quality.bic
        ));
    }
    for (kind, reason) in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {reason}\n", kind.display_name()));
    }
    out
}

/// Summary of a single strain: curve size, hypotheses, derived quantities.
pub fn format_strain_summary(
    strain: &str,
    curve: &GrowthCurve,
    best: &FitResult,
    has_lag: Option<bool>,
    has_nu: Option<bool>,
    growth: Option<&MaxGrowth>,
    lag: Option<&LagEstimate>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Strain {strain}: {} time points, t=[{:.2}, {:.2}] h, weighted={}\n",
        curve.len(),
        curve.time.first().copied().unwrap_or(0.0),
        curve.max_time().unwrap_or(0.0),
        if curve.weights().is_some() { "yes" } else { "no" },
    ));
    out.push_str(&format!("Best model: {} ({})\n", best.model.display_name(), best.model.id()));
    out.push_str(&format!(
        "Lag phase supported: {} | nu != 1 supported: {}\n",
        fmt_opt_bool(has_lag),
        fmt_opt_bool(has_nu)
    ));
    if best.model.has_lag() {
        out.push_str(&format!("Lag from q0/v: {:.3} h\n", best.lag));
    }
    if let Some(lag) = lag {
        out.push_str(&format!(
            "Lag from tangent: {:.3} h (slope {} at t={:.3} h)\n",
            lag.lag,
            fmt_g(lag.slope),
            lag.t1
        ));
    }
    if let Some(g) = growth {
        out.push_str(&format!(
            "Max growth rate: {} OD/h at t={:.3} h | max specific growth rate: {} 1/h at t={:.3} h\n",
            fmt_g(g.a),
            g.t1,
            fmt_g(g.mu),
            g.t2
        ));
    }
    out
}

/// Table of batch results.
pub fn format_results_table(rows: &[StrainResult]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:<8} {:<28} {:>10} {:>8} {:>8} {:>8} {:>6} {:>6}\n",
            "file", "strain", "model", "BIC", "r", "K", "lag", "lag?", "w"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<8} {:-<28} {:->10} {:->8} {:->8} {:->8} {:->6} {:->6}\n",
            "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        let w = r.w.map(|w| format!("{w:.3}")).unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<16} {:<8} {:<28} {:>10.2} {:>8.4} {:>8.4} {:>8.3} {:>6} {:>6}\n",
                truncate(file_name(&r.file), 16),
                truncate(&r.strain, 8),
                r.model,
                r.bic,
                r.r,
                r.k,
                r.lag,
                fmt_opt_bool(r.has_lag),
                w,
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Largest residuals of a fit, with the overall RMSE.
pub fn format_residuals(top: &[Residual], rmse: f64) -> String {
    let mut out = String::new();
    out.push_str(&format!("Residuals: RMSE={}\n", fmt_g(rmse)));
    out.push_str(format!("{:>10} {:>10} {:>10} {:>10}", "time", "observed", "fitted", "residual").trim_end());
    out.push('\n');
    out.push_str(format!("{:->10} {:->10} {:->10} {:->10}", "", "", "", "").trim_end());
    out.push('\n');
    for r in top {
        out.push_str(&format!(
            "{:>10.3} {:>10.4} {:>10.4} {:>+10.4}\n",
            r.time, r.y_obs, r.y_fit, r.residual
        ));
    }
    out
}

/// Compact general-format number (like `%g` with 6 significant digits).
pub fn fmt_g(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{v}");
    }
    let exp = v.abs().log10().floor() as i32;
    if !(-4..6).contains(&exp) {
        return format!("{v:.5e}");
    }
    let decimals = (5 - exp).max(0) as usize;
    let s = format!("{v:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

fn fmt_opt_bool(v: Option<bool>) -> &'static str {
    match v {
        Some(true) => "yes",
        Some(false) => "no",
        None => "n/a",
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GrowthParams, ModelKind, ParamError};
    use crate::fit::fit_quality;

    fn br_fit() -> FitResult {
        let params = GrowthParams {
            y0: 0.05,
            r: 1.25,
            k: 0.8,
            nu: 1.0,
            q0: Some(0.5),
            v: Some(2.0),
        };
        FitResult {
            model: ModelKind::BaranyiRobertsNu1,
            params,
            init: GrowthParams { r: 1.0, ..params },
            errors: vec![
                ParamError { name: ParamName::Y0, stderr: Some(0.001) },
                ParamError { name: ParamName::R, stderr: Some(0.05) },
                ParamError { name: ParamName::K, stderr: None },
                ParamError { name: ParamName::Q0, stderr: Some(0.1) },
                ParamError { name: ParamName::V, stderr: Some(0.2) },
            ],
            quality: fit_quality(40, 5, 0.004),
            lag: 1.0,
            converged: true,
            iterations: 12,
            t_max: 12.0,
        }
    }

    #[test]
    fn general_number_format() {
        assert_eq!(fmt_g(0.05), "0.05");
        assert_eq!(fmt_g(1.25), "1.25");
        assert_eq!(fmt_g(123.456789), "123.457");
        assert_eq!(fmt_g(0.0), "0");
        assert_eq!(fmt_g(1.5e-7), "1.50000e-7");
    }

    #[test]
    fn fit_report_lists_variables() {
        let report = format_fit_report(&br_fit());
        assert!(report.starts_with("[[Model]]\n    Baranyi-Roberts (nu=1)\n"));
        assert!(report.contains("    # data points      = 40\n"));
        assert!(report.contains("    y0: 0.05 +/- 0.001 (2.00%) (init = 0.05)\n"));
        assert!(report.contains("    r:  1.25 +/- 0.05 (4.00%) (init = 1)\n"));
        assert!(report.contains("    K:  0.8 (init = 0.8)\n"));
        assert!(report.contains("    nu: 1 (fixed)\n"));
        assert!(!report.contains("Warning"));
    }

    #[test]
    fn residual_table_lines() {
        let top = [Residual {
            time: 1.5,
            y_obs: 0.3,
            y_fit: 0.35,
            residual: -0.05,
        }];
        let txt = format_residuals(&top, 0.02);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "Residuals: RMSE=0.02");
        assert_eq!(lines[3], "     1.500     0.3000     0.3500    -0.0500");
    }

    #[test]
    fn results_table_snapshot() {
        let rows = vec![StrainResult {
            file: "data/run1".to_string(),
            strain: "1".to_string(),
            model: "logistic".to_string(),
            bic: -123.456,
            aic: -130.0,
            y0: 0.05,
            k: 0.8,
            r: 1.1,
            nu: 1.0,
            q0: 0.0,
            v: 0.0,
            max_growth_rate: 0.22,
            lag: 1.5,
            has_lag: Some(false),
            has_nu: Some(false),
            w: Some(1.0),
        }];
        let table = format_results_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("file             strain   model"));
        assert!(lines[2].starts_with("run1             1        logistic"));
        assert!(lines[2].ends_with("-123.46   1.1000   0.8000    1.500     no  1.000"));
    }
}
