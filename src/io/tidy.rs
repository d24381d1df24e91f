//! Tidy (long-format) measurement CSV.
//!
//! One observation per line. Recognized columns (case-insensitive):
//!
//! - `Time` (hours), required
//! - `Well`, or `Row` + `Col`, required
//! - the value column: the requested label (e.g. `OD`) or `Value`
//! - optional `Cycle Nr.`, `Strain`, `Color`, `Temp. [°C]`
//!
//! Unparseable rows are collected as row errors, not fatal.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Well;
use crate::error::AppError;
use crate::io::ingest::{RowError, build_header_map, get_optional, get_required, parse_opt_f64};

/// One parsed tidy row (strain/color may be absent).
#[derive(Debug, Clone, PartialEq)]
pub struct TidyRow {
    pub cycle: Option<u32>,
    pub time: f64,
    pub temperature: Option<f64>,
    pub well: Well,
    pub strain: Option<String>,
    pub color: Option<String>,
    pub value: f64,
}

/// Parsed tidy file.
#[derive(Debug, Clone)]
pub struct TidyData {
    pub value_column: String,
    pub rows: Vec<TidyRow>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Read a tidy CSV, taking values from the `label` column.
pub fn read_tidy_csv(path: &Path, label: &str) -> Result<TidyData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    if !header_map.contains_key("time") {
        return Err(AppError::input("Missing required column: `Time`"));
    }
    if !header_map.contains_key("well") && !(header_map.contains_key("row") && header_map.contains_key("col")) {
        return Err(AppError::input("Missing required column: `Well` (or `Row` and `Col`)"));
    }
    let value_column = [label.to_ascii_lowercase(), "value".to_string()]
        .into_iter()
        .find(|c| header_map.contains_key(c))
        .ok_or_else(|| AppError::input(format!("Missing value column: `{label}` (or `Value`)")))?;

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts at line 2 (after the header).
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map, &value_column) {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(TidyData {
        value_column,
        rows,
        row_errors,
        rows_read,
    })
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>, value_column: &str) -> Result<TidyRow, String> {
    let time = parse_f64(get_required(record, header_map, "time")?, "Time")?;
    let value = parse_f64(get_required(record, header_map, value_column)?, value_column)?;

    let well = match get_optional(record, header_map, "well") {
        Some(w) => w.parse::<Well>()?,
        None => {
            let row = get_required(record, header_map, "row")?;
            let col = get_required(record, header_map, "col")?;
            format!("{row}{col}").parse::<Well>()?
        }
    };

    let cycle = match get_optional(record, header_map, "cycle nr.") {
        Some(c) => Some(c.parse::<u32>().map_err(|_| format!("Invalid cycle number '{c}'"))?),
        None => None,
    };

    Ok(TidyRow {
        cycle,
        time,
        temperature: parse_opt_f64(get_optional(record, header_map, "temp. [°c]")),
        well,
        strain: get_optional(record, header_map, "strain").map(str::to_string),
        color: get_optional(record, header_map, "color").map(str::to_string),
        value,
    })
}

fn parse_f64(s: &str, column: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid number '{s}' in `{column}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidy.csv");
        std::fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_rows_and_collects_errors() {
        let (_dir, path) = write(
            "\u{feff}Time,Well,OD,Strain\n0.0,A1,0.1,1\n0.5,A1,0.12,1\n1.0,A1,bad,1\n1.0,Z99x,0.2,1\n",
        );
        let data = read_tidy_csv(&path, "OD").unwrap();
        assert_eq!(data.value_column, "od");
        assert_eq!(data.rows_read, 4);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 4);
        assert_eq!(data.rows[1].well, Well::new('A', 1));
        assert_eq!(data.rows[1].strain.as_deref(), Some("1"));
        assert_eq!(data.rows[1].cycle, None);
    }

    #[test]
    fn row_and_col_columns_and_value_fallback() {
        let (_dir, path) = write("time,row,col,value,Cycle Nr.\n0,b,7,0.3,1\n");
        let data = read_tidy_csv(&path, "OD").unwrap();
        assert_eq!(data.rows[0].well, Well::new('B', 7));
        assert_eq!(data.rows[0].cycle, Some(1));
        assert!(data.rows[0].strain.is_none());
    }

    #[test]
    fn missing_columns_are_input_errors() {
        let (_dir, path) = write("Time,OD\n0,0.1\n");
        assert_eq!(read_tidy_csv(&path, "OD").unwrap_err().exit_code(), 2);
        let (_dir, path) = write("Time,Well,Green\n0,A1,0.1\n");
        assert!(read_tidy_csv(&path, "OD").is_err());
    }
}
