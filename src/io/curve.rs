//! Read/write fit JSON files.
//!
//! A fit JSON is the "portable" representation of one fitted strain:
//! - model kind, parameters, standard errors and fit quality
//! - run metadata (tool version, timestamp, source file, strain)
//! - the aggregated data and a precomputed fitted grid for quick plotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CurveGrid, FitFile, FitResult, GrowthCurve};
use crate::error::AppError;
use crate::math::linspace;
use crate::models::predict_many;

/// Points in the exported fitted grid.
pub const GRID_POINTS: usize = 101;

/// Assemble the portable representation of a fit.
pub fn fit_file(fit: &FitResult, curve: &GrowthCurve, source: Option<&Path>, strain: Option<&str>) -> FitFile {
    FitFile {
        tool: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: Utc::now().to_rfc3339(),
        source: source.map(|p| p.display().to_string()),
        strain: strain.map(str::to_string),
        fit: fit.clone(),
        data: CurveGrid {
            time: curve.time.clone(),
            y: curve.value.clone(),
        },
        grid: build_grid(fit, GRID_POINTS),
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, file: &FitFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file).map_err(|e| AppError::input(format!("Failed to write fit JSON: {e}")))
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::input(format!("Invalid fit JSON: {e}")))
}

/// The fitted curve sampled uniformly over `[0, t_max]`.
pub fn build_grid(fit: &FitResult, n: usize) -> CurveGrid {
    let t_max = if fit.t_max.is_finite() && fit.t_max > 0.0 {
        fit.t_max
    } else {
        1.0
    };
    let time = linspace(0.0, t_max, n.max(2));
    let y = predict_many(fit.model, &time, &fit.params);
    CurveGrid { time, y }
}
