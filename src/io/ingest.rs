//! Measurement ingest and normalization.
//!
//! Turns a plate-reader file into a clean list of tidy `Measurement`s:
//!
//! - **Handler by extension**: `.csv` is read; vendor binaries (`.xlsx`,
//!   `.mat`) are recognized but reported as unsupported
//! - **Format sniffing**: a CSV whose first line has a `Time` column is tidy,
//!   anything else is treated as a Tecan block sheet
//! - **Plate join**: wells are mapped to strains/colors; wells missing from the
//!   plate are dropped
//! - **Time filter**: only `time < max_time` is kept when a limit is given

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info};

use crate::domain::{DEFAULT_COLOR, Measurement};
use crate::error::AppError;
use crate::io::tecan::read_tecan_csv;
use crate::io::tidy::{TidyRow, read_tidy_csv};
use crate::plate::{Plate, lookup};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// How a data file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileHandler {
    Csv,
    /// Vendor binary format we recognize but cannot read.
    Unsupported(&'static str),
}

/// Concrete layout of a CSV data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    Tidy,
    TecanBlocks,
}

/// Options for loading a data file.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    /// Measurement labels to read; the first is the one that gets fitted.
    pub labels: &'a [String],
    pub plate: Option<&'a Plate>,
    pub max_time: Option<f64>,
}

/// Ingest output: tidy measurements + diagnostics.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub layout: CsvLayout,
    pub measurements: Vec<Measurement>,
    pub row_errors: Vec<RowError>,
    /// Wells with data but no entry on the plate.
    pub dropped_wells: usize,
    /// Observations removed by the time filter.
    pub dropped_late: usize,
}

impl LoadedData {
    /// Measurements of one strain for one label.
    pub fn strain_measurements<'a>(&'a self, strain: &'a str, label: &'a str) -> impl Iterator<Item = &'a Measurement> {
        self.measurements
            .iter()
            .filter(move |m| m.strain == strain && m.label == label)
    }

    pub fn max_time(&self) -> Option<f64> {
        self.measurements.iter().map(|m| m.time).reduce(f64::max)
    }
}

/// Pick a handler from the file extension (`None` for unrelated files).
pub fn file_handler(path: &Path) -> Option<FileHandler> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(FileHandler::Csv),
        "xlsx" | "xls" => Some(FileHandler::Unsupported("Excel workbook; export the sheet to CSV")),
        "mat" => Some(FileHandler::Unsupported("MATLAB file; export the plate to CSV")),
        _ => None,
    }
}

/// Detect tidy vs Tecan block layout from the first non-empty line.
pub fn sniff_layout(text: &str) -> CsvLayout {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let has_time = first
        .split(',')
        .any(|c| normalize_header_name(c.trim_matches('"')) == "time");
    if has_time {
        CsvLayout::Tidy
    } else {
        CsvLayout::TecanBlocks
    }
}

/// Load a data file into tidy measurements.
pub fn load_measurements(path: &Path, opts: &LoadOptions<'_>) -> Result<LoadedData, AppError> {
    match file_handler(path) {
        Some(FileHandler::Csv) => {}
        Some(FileHandler::Unsupported(why)) => {
            return Err(AppError::input(format!("Unsupported data file '{}': {why}.", path.display())));
        }
        None => {
            return Err(AppError::input(format!("No handler for data file '{}'.", path.display())));
        }
    }
    let Some(primary) = opts.labels.first() else {
        return Err(AppError::input("At least one measurement label is required."));
    };

    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display())))?;
    let layout = sniff_layout(&text);
    debug!(path = %path.display(), ?layout, "reading data file");

    let mut dropped_wells = 0usize;
    let mut measurements = Vec::new();
    let mut row_errors = Vec::new();

    match layout {
        CsvLayout::TecanBlocks => {
            for block in read_tecan_csv(path, opts.labels)? {
                for (well, values) in &block.wells {
                    let Some((strain, color)) = lookup(opts.plate, well) else {
                        dropped_wells += 1;
                        continue;
                    };
                    for (i, &value) in values.iter().enumerate() {
                        measurements.push(Measurement {
                            label: block.label.clone(),
                            cycle: block.cycle[i],
                            time: block.time[i],
                            temperature: block.temperature.as_ref().map(|t| t[i]),
                            well: *well,
                            strain: strain.clone(),
                            color: color.clone(),
                            value,
                        });
                    }
                }
            }
        }
        CsvLayout::Tidy => {
            let data = read_tidy_csv(path, primary)?;
            row_errors = data.row_errors;
            let times = distinct_times(&data.rows);
            let mut unplated = std::collections::HashSet::new();
            for row in data.rows {
                let (strain, color) = match (row.strain, lookup(opts.plate, &row.well)) {
                    (Some(s), plated) => {
                        let color = row
                            .color
                            .or_else(|| plated.map(|(_, c)| c))
                            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
                        (s, color)
                    }
                    (None, Some(plated)) => plated,
                    (None, None) => {
                        unplated.insert(row.well);
                        continue;
                    }
                };
                measurements.push(Measurement {
                    label: primary.clone(),
                    cycle: row.cycle.unwrap_or_else(|| cycle_from_time(&times, row.time)),
                    time: row.time,
                    temperature: row.temperature,
                    well: row.well,
                    strain,
                    color,
                    value: row.value,
                });
            }
            dropped_wells = unplated.len();
        }
    }

    let before = measurements.len();
    if let Some(max_time) = opts.max_time {
        measurements.retain(|m| m.time < max_time);
    }
    let dropped_late = before - measurements.len();

    if measurements.is_empty() {
        return Err(AppError::data(format!(
            "No measurements remain in '{}' after plate join and time filter.",
            path.display()
        )));
    }
    info!(
        path = %path.display(),
        measurements = measurements.len(),
        dropped_wells,
        dropped_late,
        row_errors = row_errors.len(),
        "loaded data file"
    );

    Ok(LoadedData {
        layout,
        measurements,
        row_errors,
        dropped_wells,
        dropped_late,
    })
}

/// Sorted distinct sampling times of a tidy file.
fn distinct_times(rows: &[TidyRow]) -> Vec<f64> {
    let mut times: Vec<f64> = rows.iter().map(|r| r.time).collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

/// 1-based rank of `time` among the sampling times, used when a tidy file has
/// no cycle column so that wells read together share a cycle.
fn cycle_from_time(times: &[f64], time: f64) -> u32 {
    times.partition_point(|&t| t < time) as u32 + 1
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

pub(crate) fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

pub(crate) fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Well;
    use crate::plate::parse_matrix;

    const SHEET: &str = "\
OD
Cycle Nr.,1,2,3
Time [s],0,3600,7200
A1,0.10,0.20,0.40
A2,0.05,0.05,0.05
B1,0.11,0.21,0.41
";

    fn write(name: &str, text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn handlers_by_extension() {
        assert_eq!(file_handler(Path::new("a/plate.CSV")), Some(FileHandler::Csv));
        assert!(matches!(file_handler(Path::new("x.xlsx")), Some(FileHandler::Unsupported(_))));
        assert!(matches!(file_handler(Path::new("x.mat")), Some(FileHandler::Unsupported(_))));
        assert_eq!(file_handler(Path::new("notes.txt")), None);
        assert_eq!(file_handler(Path::new("curveball")), None);
    }

    #[test]
    fn sniffing() {
        assert_eq!(sniff_layout("\u{feff}\"Time\",Well,OD\n"), CsvLayout::Tidy);
        assert_eq!(sniff_layout(SHEET), CsvLayout::TecanBlocks);
    }

    #[test]
    fn tecan_join_with_plate_and_time_filter() {
        let (_dir, path) = write("run.csv", SHEET);
        // 1x1 plate: only A1 is known, A2/B1 are dropped.
        let plate = parse_matrix("1\n").unwrap();
        let labels = vec!["OD".to_string()];
        let data = load_measurements(
            &path,
            &LoadOptions {
                labels: &labels,
                plate: Some(&plate),
                max_time: Some(2.0),
            },
        )
        .unwrap();

        assert_eq!(data.layout, CsvLayout::TecanBlocks);
        assert_eq!(data.dropped_wells, 2);
        // t = 2h is excluded by the strict filter.
        assert_eq!(data.dropped_late, 1);
        assert_eq!(data.measurements.len(), 2);
        let m = &data.measurements[1];
        assert_eq!((m.cycle, m.time, m.value), (2, 1.0, 0.20));
        assert_eq!(m.strain, "1");
        assert_eq!(data.max_time(), Some(1.0));
    }

    #[test]
    fn without_plate_every_well_is_default_strain() {
        let (_dir, path) = write("run.csv", SHEET);
        let labels = vec!["OD".to_string()];
        let data = load_measurements(
            &path,
            &LoadOptions {
                labels: &labels,
                plate: None,
                max_time: None,
            },
        )
        .unwrap();
        assert_eq!(data.measurements.len(), 9);
        assert!(data.measurements.iter().all(|m| m.strain == "0" && m.color == DEFAULT_COLOR));
    }

    #[test]
    fn tidy_strain_column_wins_over_plate() {
        let (_dir, path) = write("tidy.csv", "Time,Well,OD,Strain\n0,A1,0.1,wt\n0,B2,0.1,\n0,A2,0.2,\n");
        let plate = parse_matrix("1, 2\n").unwrap();
        let labels = vec!["OD".to_string()];
        let data = load_measurements(
            &path,
            &LoadOptions {
                labels: &labels,
                plate: Some(&plate),
                max_time: None,
            },
        )
        .unwrap();
        assert_eq!(data.layout, CsvLayout::Tidy);
        assert_eq!(data.dropped_wells, 1);
        let strains: Vec<&str> = data.measurements.iter().map(|m| m.strain.as_str()).collect();
        assert_eq!(strains, vec!["wt", "2"]);
        assert_eq!(data.measurements[1].well, Well::new('A', 2));
        assert_eq!(data.strain_measurements("2", "OD").count(), 1);
    }

    #[test]
    fn tidy_without_cycle_column_numbers_cycles_by_time() {
        let (_dir, path) = write(
            "tidy.csv",
            "Time,Well,OD,Strain\n0,A1,0.10,0\n0,A2,0.50,1\n1,A1,0.10,0\n1,A2,0.90,1\n0.5,A2,0.70,1\n",
        );
        let labels = vec!["OD".to_string()];
        let data = load_measurements(
            &path,
            &LoadOptions {
                labels: &labels,
                plate: None,
                max_time: None,
            },
        )
        .unwrap();
        let cycles: Vec<u32> = data.measurements.iter().map(|m| m.cycle).collect();
        assert_eq!(cycles, vec![1, 1, 3, 3, 2]);
    }

    #[test]
    fn unsupported_and_empty_files() {
        let (_dir, path) = write("run.xlsx", "");
        let labels = vec!["OD".to_string()];
        let opts = LoadOptions {
            labels: &labels,
            plate: None,
            max_time: None,
        };
        assert_eq!(load_measurements(&path, &opts).unwrap_err().exit_code(), 2);

        let (_dir, path) = write("run.csv", SHEET);
        let opts = LoadOptions {
            max_time: Some(0.0),
            ..opts
        };
        assert_eq!(load_measurements(&path, &opts).unwrap_err().exit_code(), 3);
    }
}
