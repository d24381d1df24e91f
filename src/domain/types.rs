//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Strain assigned to wells when no plate template is given.
pub const DEFAULT_STRAIN: &str = "0";
/// Color assigned to wells when no plate template is given.
pub const DEFAULT_COLOR: &str = "#000000";

/// Plate row letters, in order.
pub const ROW_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A microplate well, e.g. `B7` = row `B`, column 7 (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Well {
    pub row: char,
    pub col: u32,
}

impl Well {
    pub fn new(row: char, col: u32) -> Self {
        Self {
            row: row.to_ascii_uppercase(),
            col,
        }
    }

    /// Zero-based row index (`A` = 0).
    pub fn row_index(&self) -> Option<usize> {
        ROW_LETTERS.find(self.row)
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.col)
    }
}

impl FromStr for Well {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| ROW_LETTERS.contains(*c))
            .ok_or_else(|| format!("Invalid well name '{s}': expected a row letter."))?;
        let col: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| format!("Invalid well name '{s}': expected a column number."))?;
        if col == 0 {
            return Err(format!("Invalid well name '{s}': columns start at 1."));
        }
        Ok(Well { row, col })
    }
}

/// One tidy plate-reader observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name (e.g. `OD`, `Green`).
    pub label: String,
    pub cycle: u32,
    /// Hours since the start of the run.
    pub time: f64,
    pub temperature: Option<f64>,
    pub well: Well,
    pub strain: String,
    pub color: String,
    pub value: f64,
}

/// Replicate-aggregated growth curve of a single strain.
///
/// `std[i]` is the sample standard deviation over replicates at `time[i]`
/// (`None` when only one replicate was measured).
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthCurve {
    pub time: Vec<f64>,
    pub value: Vec<f64>,
    pub std: Vec<Option<f64>>,
}

impl GrowthCurve {
    /// Build a curve from raw `(time, value)` pairs, averaging replicates that
    /// share a time point. Output is sorted by time.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (f64, f64)>) -> Self {
        // Microsecond keys: replicate wells read in the same cycle share a time.
        let mut groups: BTreeMap<i64, (f64, Vec<f64>)> = BTreeMap::new();
        for (t, y) in pairs {
            if !(t.is_finite() && y.is_finite()) {
                continue;
            }
            let key = (t * 3_600_000_000.0).round() as i64;
            groups.entry(key).or_insert_with(|| (t, Vec::new())).1.push(y);
        }

        let mut time = Vec::with_capacity(groups.len());
        let mut value = Vec::with_capacity(groups.len());
        let mut std = Vec::with_capacity(groups.len());
        for (_, (t, ys)) in groups {
            let n = ys.len() as f64;
            let mean = ys.iter().sum::<f64>() / n;
            let sd = if ys.len() > 1 {
                let var = ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0);
                Some(var.sqrt())
            } else {
                None
            };
            time.push(t);
            value.push(mean);
            std.push(sd);
        }

        Self { time, value, std }
    }

    /// Aggregate measurements (all assumed to belong to one strain and label).
    pub fn from_measurements<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Self {
        Self::from_pairs(measurements.into_iter().map(|m| (m.time, m.value)))
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn max_time(&self) -> Option<f64> {
        self.time.iter().copied().reduce(f64::max)
    }

    /// Residual weights `1/std`, or `None` when any point lacks a usable std.
    pub fn weights(&self) -> Option<Vec<f64>> {
        self.std
            .iter()
            .map(|s| match s {
                Some(s) if s.is_finite() && *s > 0.0 => Some(1.0 / s),
                _ => None,
            })
            .collect()
    }
}

/// Parameter names of the growth model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamName {
    #[serde(rename = "y0")]
    Y0,
    #[serde(rename = "r")]
    R,
    #[serde(rename = "K")]
    K,
    #[serde(rename = "nu")]
    Nu,
    #[serde(rename = "q0")]
    Q0,
    #[serde(rename = "v")]
    V,
}

impl ParamName {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::Y0 => "y0",
            ParamName::R => "r",
            ParamName::K => "K",
            ParamName::Nu => "nu",
            ParamName::Q0 => "q0",
            ParamName::V => "v",
        }
    }

    /// Lower/upper bounds used during fitting.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            ParamName::Q0 => (PARAM_MIN, 1.0),
            _ => (PARAM_MIN, f64::INFINITY),
        }
    }
}

/// Lower bound for every growth parameter.
pub const PARAM_MIN: f64 = 1e-10;

/// Growth model parameters.
///
/// `q0`/`v` are only present for models with a lag phase. `nu` is `1.0` for
/// models without curvature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    pub y0: f64,
    pub r: f64,
    #[serde(rename = "K")]
    pub k: f64,
    pub nu: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q0: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<f64>,
}

impl GrowthParams {
    pub fn get(&self, name: ParamName) -> Option<f64> {
        match name {
            ParamName::Y0 => Some(self.y0),
            ParamName::R => Some(self.r),
            ParamName::K => Some(self.k),
            ParamName::Nu => Some(self.nu),
            ParamName::Q0 => self.q0,
            ParamName::V => self.v,
        }
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        match name {
            ParamName::Y0 => self.y0 = value,
            ParamName::R => self.r = value,
            ParamName::K => self.k = value,
            ParamName::Nu => self.nu = value,
            ParamName::Q0 => self.q0 = Some(value),
            ParamName::V => self.v = Some(value),
        }
    }
}

/// Concrete growth model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Logistic (Richards with `nu = 1`), 3 parameters.
    Logistic,
    /// Richards / generalized logistic, 4 parameters.
    Richards,
    /// Baranyi–Roberts with `nu = 1` and `v = r`, 4 parameters.
    SimplifiedBaranyiRoberts,
    /// Baranyi–Roberts with `nu` fixed to 1, 5 parameters.
    #[value(name = "baranyi-roberts-nu1")]
    BaranyiRobertsNu1,
    /// Richards with lag, 6 parameters.
    BaranyiRoberts,
}

impl ModelKind {
    /// Default fit order (most to least complex).
    pub const DEFAULT_FIT_ORDER: [ModelKind; 4] = [
        ModelKind::BaranyiRoberts,
        ModelKind::BaranyiRobertsNu1,
        ModelKind::Richards,
        ModelKind::Logistic,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Logistic => "Logistic",
            ModelKind::Richards => "Richards",
            ModelKind::SimplifiedBaranyiRoberts => "Simplified Baranyi-Roberts",
            ModelKind::BaranyiRobertsNu1 => "Baranyi-Roberts (nu=1)",
            ModelKind::BaranyiRoberts => "Baranyi-Roberts",
        }
    }

    /// Stable identifier used in CSV/JSON outputs.
    pub fn id(self) -> &'static str {
        match self {
            ModelKind::Logistic => "logistic",
            ModelKind::Richards => "richards",
            ModelKind::SimplifiedBaranyiRoberts => "simplified_baranyi_roberts",
            ModelKind::BaranyiRobertsNu1 => "baranyi_roberts_nu1",
            ModelKind::BaranyiRoberts => "baranyi_roberts",
        }
    }

    /// Parameters estimated by the fitter for this model.
    pub fn free_params(self) -> &'static [ParamName] {
        use ParamName::*;
        match self {
            ModelKind::Logistic => &[Y0, R, K],
            ModelKind::Richards => &[Y0, R, K, Nu],
            ModelKind::SimplifiedBaranyiRoberts => &[Y0, R, K, Q0],
            ModelKind::BaranyiRobertsNu1 => &[Y0, R, K, Q0, V],
            ModelKind::BaranyiRoberts => &[Y0, R, K, Nu, Q0, V],
        }
    }

    /// Number of varying parameters (for information criteria).
    pub fn param_count(self) -> usize {
        self.free_params().len()
    }

    /// Whether the model has a lag phase (`q0` parameter).
    pub fn has_lag(self) -> bool {
        matches!(
            self,
            ModelKind::SimplifiedBaranyiRoberts
                | ModelKind::BaranyiRobertsNu1
                | ModelKind::BaranyiRoberts
        )
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Which model(s) to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    /// Baranyi–Roberts (6p and nu=1), Richards and logistic.
    Auto,
    /// `auto` plus the simplified Baranyi–Roberts model.
    All,
    Logistic,
    Richards,
    Simplified,
    BaranyiRoberts,
}

impl ModelSpec {
    pub fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelSpec::Auto => ModelKind::DEFAULT_FIT_ORDER.to_vec(),
            ModelSpec::All => vec![
                ModelKind::BaranyiRoberts,
                ModelKind::BaranyiRobertsNu1,
                ModelKind::SimplifiedBaranyiRoberts,
                ModelKind::Richards,
                ModelKind::Logistic,
            ],
            ModelSpec::Logistic => vec![ModelKind::Logistic],
            ModelSpec::Richards => vec![ModelKind::Richards],
            ModelSpec::Simplified => vec![ModelKind::SimplifiedBaranyiRoberts],
            ModelSpec::BaranyiRoberts => vec![ModelKind::BaranyiRoberts],
        }
    }
}

/// Fit quality diagnostics (lmfit conventions).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub ndata: usize,
    pub nvarys: usize,
    /// Weighted sum of squared residuals.
    pub chisqr: f64,
    pub redchi: f64,
    pub aic: f64,
    pub bic: f64,
}

/// Standard error of one free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamError {
    pub name: ParamName,
    pub stderr: Option<f64>,
}

/// Fit output for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub params: GrowthParams,
    /// Initial values the winning start began from.
    pub init: GrowthParams,
    pub errors: Vec<ParamError>,
    pub quality: FitQuality,
    /// Lag duration implied by `q0`/`v` (0 for models without lag).
    pub lag: f64,
    pub converged: bool,
    pub iterations: usize,
    /// Largest observed time; used as the default span for derived quantities.
    pub t_max: f64,
}

impl FitResult {
    pub fn stderr(&self, name: ParamName) -> Option<f64> {
        self.errors
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.stderr)
    }
}

/// One row of the batch results CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainResult {
    pub file: String,
    pub strain: String,
    pub model: String,
    pub bic: f64,
    pub aic: f64,
    pub y0: f64,
    #[serde(rename = "K")]
    pub k: f64,
    pub r: f64,
    pub nu: f64,
    pub q0: f64,
    pub v: f64,
    pub max_growth_rate: f64,
    pub lag: f64,
    pub has_lag: Option<bool>,
    pub has_nu: Option<bool>,
    pub w: Option<f64>,
}

/// A saved fit file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub version: String,
    pub generated_at: String,
    pub source: Option<String>,
    pub strain: Option<String>,
    pub fit: FitResult,
    pub data: CurveGrid,
    pub grid: CurveGrid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub time: Vec<f64>,
    pub y: Vec<f64>,
}

/// Batch analysis configuration, derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub folder: PathBuf,
    pub plate_path: PathBuf,
    pub blank_strain: String,
    pub ref_strain: String,
    pub max_time: Option<f64>,
    pub label: String,
    pub model_spec: ModelSpec,
    pub subtract_blank: bool,
    pub plot: bool,
    pub confirm: bool,
    pub fit: FitOptions,
}

/// Knobs for the nonlinear optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub max_iter: usize,
    /// Relative chisqr improvement below which the optimizer stops.
    pub tol: f64,
    /// Evaluate the multi-start grid (otherwise only the data-driven guess).
    pub multi_start: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-10,
            multi_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_parses_and_displays() {
        let w: Well = "b7".parse().unwrap();
        assert_eq!(w, Well::new('B', 7));
        assert_eq!(w.to_string(), "B7");
        assert_eq!(w.row_index(), Some(1));
        assert!("7B".parse::<Well>().is_err());
        assert!("A0".parse::<Well>().is_err());
        assert!("A".parse::<Well>().is_err());
    }

    #[test]
    fn curve_averages_replicates() {
        let curve = GrowthCurve::from_pairs(vec![(1.0, 0.2), (0.0, 0.1), (1.0, 0.4), (0.0, 0.1)]);
        assert_eq!(curve.time, vec![0.0, 1.0]);
        assert!((curve.value[1] - 0.3).abs() < 1e-12);
        assert_eq!(curve.std[0], Some(0.0));
        assert!((curve.std[1].unwrap() - 0.02_f64.sqrt()).abs() < 1e-12);
        // A zero std disables weighting.
        assert!(curve.weights().is_none());
    }

    #[test]
    fn single_replicate_has_no_weights() {
        let curve = GrowthCurve::from_pairs(vec![(0.0, 0.1), (1.0, 0.2)]);
        assert_eq!(curve.std, vec![None, None]);
        assert!(curve.weights().is_none());
    }

    #[test]
    fn model_kinds_have_expected_param_counts() {
        assert_eq!(ModelKind::Logistic.param_count(), 3);
        assert_eq!(ModelKind::Richards.param_count(), 4);
        assert_eq!(ModelKind::SimplifiedBaranyiRoberts.param_count(), 4);
        assert_eq!(ModelKind::BaranyiRobertsNu1.param_count(), 5);
        assert_eq!(ModelKind::BaranyiRoberts.param_count(), 6);
        assert!(!ModelKind::Richards.has_lag());
        assert!(ModelKind::BaranyiRobertsNu1.has_lag());
    }
}
