//! Export per-strain results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream
//! scripts. One row per (file, strain), columns follow `StrainResult`.

use std::path::Path;

use crate::domain::StrainResult;
use crate::error::AppError;

/// File name of the batch results inside the processed folder.
pub const RESULTS_FILE_NAME: &str = "curveball.csv";

/// Write per-strain results to a CSV file.
pub fn write_results_csv(path: &Path, results: &[StrainResult]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create results CSV '{}': {e}", path.display())))?;

    if results.is_empty() {
        // serde only emits the header with the first record.
        writer
            .write_record(RESULT_COLUMNS)
            .map_err(|e| AppError::input(format!("Failed to write results CSV header: {e}")))?;
    }
    for r in results {
        writer
            .serialize(r)
            .map_err(|e| AppError::input(format!("Failed to write results CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write results CSV '{}': {e}", path.display())))
}

/// Read a results CSV back (used by tests and downstream tooling).
pub fn read_results_csv(path: &Path) -> Result<Vec<StrainResult>, AppError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to open results CSV '{}': {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<StrainResult>, _>>()
        .map_err(|e| AppError::input(format!("Invalid results CSV: {e}")))
}

const RESULT_COLUMNS: [&str; 16] = [
    "file",
    "strain",
    "model",
    "bic",
    "aic",
    "y0",
    "K",
    "r",
    "nu",
    "q0",
    "v",
    "max_growth_rate",
    "lag",
    "has_lag",
    "has_nu",
    "w",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn row(strain: &str, w: Option<f64>) -> StrainResult {
        StrainResult {
            file: "data/run1".to_string(),
            strain: strain.to_string(),
            model: "baranyi_roberts".to_string(),
            bic: -250.5,
            aic: -260.25,
            y0: 0.05,
            k: 0.9,
            r: 1.1,
            nu: 1.0,
            q0: 0.2,
            v: 2.0,
            max_growth_rate: 0.31,
            lag: 1.5,
            has_lag: Some(true),
            has_nu: None,
            w,
        }
    }

    #[test]
    fn results_round_trip_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULTS_FILE_NAME);
        let rows = vec![row("1", Some(1.0)), row("2", None)];
        write_results_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), RESULT_COLUMNS.join(","));
        assert!(text.lines().nth(1).unwrap().ends_with(",true,,1.0"));
        assert_eq!(read_results_csv(&path).unwrap(), rows);
    }

    #[test]
    fn empty_results_still_have_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULTS_FILE_NAME);
        write_results_csv(&path, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), RESULT_COLUMNS.join(","));
    }
}
