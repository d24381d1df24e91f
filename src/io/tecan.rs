//! Tecan plate-reader block exports (sheet saved as CSV).
//!
//! A Tecan sheet holds one block per measurement label:
//!
//! ```text
//! OD
//! Cycle Nr.,1,2,3,...
//! Time [s],0,600,1200,...
//! Temp. [°C],30.1,30.0,30.2,...
//! A1,0.102,0.104,0.110,...
//! ...
//! <blank line>
//! ```
//!
//! The block starts at the first row whose first cell equals the label and ends
//! at the first row with an empty first cell. Non-numeric cells are dropped and
//! every series is truncated to the shortest one.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::domain::Well;
use crate::error::AppError;

pub const CYCLE_KEY: &str = "Cycle Nr.";
pub const TIME_KEY: &str = "Time [s]";
pub const TEMPERATURE_KEY: &str = "Temp. [°C]";

/// One label block, with time already converted to hours.
#[derive(Debug, Clone, PartialEq)]
pub struct TecanBlock {
    pub label: String,
    pub cycle: Vec<u32>,
    pub time: Vec<f64>,
    pub temperature: Option<Vec<f64>>,
    pub wells: Vec<(Well, Vec<f64>)>,
}

impl TecanBlock {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Read all raw rows of a sheet.
pub fn read_sheet(path: &Path) -> Result<Vec<StringRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open Tecan CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::input(format!("Failed to parse Tecan CSV '{}': {e}", path.display())))
}

/// Extract the block titled `label` from the sheet rows.
pub fn parse_block(rows: &[StringRecord], label: &str) -> Result<TecanBlock, AppError> {
    let start = rows
        .iter()
        .position(|r| first_cell(r) == label)
        .ok_or_else(|| AppError::input(format!("Label '{label}' not found in Tecan sheet.")))?;

    let mut series: Vec<(String, Vec<f64>)> = Vec::new();
    for row in &rows[start + 1..] {
        let key = first_cell(row);
        if key.is_empty() {
            break;
        }
        let values = row
            .iter()
            .skip(1)
            .filter_map(|c| c.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        series.push((key.to_string(), values));
    }

    let min_len = series.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
    for (_, v) in &mut series {
        v.truncate(min_len);
    }

    let take = |key: &str| series.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    let time_s = take(TIME_KEY)
        .ok_or_else(|| AppError::input(format!("Label '{label}' block has no '{TIME_KEY}' row.")))?;
    let cycle = match take(CYCLE_KEY) {
        Some(c) => c.iter().map(|&x| x.round().max(0.0) as u32).collect(),
        None => (1..=time_s.len() as u32).collect(),
    };
    let temperature = take(TEMPERATURE_KEY);

    let mut wells = Vec::new();
    for (key, values) in &series {
        if key == TIME_KEY || key == CYCLE_KEY || key == TEMPERATURE_KEY {
            continue;
        }
        match key.parse::<Well>() {
            Ok(well) => wells.push((well, values.clone())),
            Err(_) => debug!(label, key = key.as_str(), "skipping non-well row"),
        }
    }
    if wells.is_empty() {
        return Err(AppError::data(format!("Label '{label}' block has no well rows.")));
    }

    Ok(TecanBlock {
        label: label.to_string(),
        cycle,
        time: time_s.iter().map(|s| s / 3600.0).collect(),
        temperature,
        wells,
    })
}

fn first_cell(row: &StringRecord) -> &str {
    row.get(0).map(|c| c.trim_start_matches('\u{feff}').trim()).unwrap_or("")
}

/// Read every requested label block from a Tecan CSV.
pub fn read_tecan_csv(path: &Path, labels: &[String]) -> Result<Vec<TecanBlock>, AppError> {
    let rows = read_sheet(path)?;
    labels.iter().map(|label| parse_block(&rows, label)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
Application,Tecan i-control
Date:,1/15/2015
,
OD
Cycle Nr.,1,2,3,4
Time [s],0,1800,3600,5400
Temp. [°C],30.1,30.0,30.2,30.1
A1,0.10,0.12,0.15,0.20
A2,0.11,0.13,OVER,0.21,0.30
B1,0.09,0.09,0.09,0.09
,
Green
Cycle Nr.,1,2
Time [s],10,1810
A1,500,520
";

    fn rows(text: &str) -> Vec<StringRecord> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes())
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn block_is_truncated_and_converted() {
        let block = parse_block(&rows(SHEET), "OD").unwrap();
        // A2 loses its OVER cell; everything is cut to its 4 values.
        assert_eq!(block.len(), 4);
        assert_eq!(block.cycle, vec![1, 2, 3, 4]);
        assert_eq!(block.time, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(block.temperature.as_ref().unwrap()[2], 30.2);
        assert_eq!(block.wells.len(), 3);
        assert_eq!(block.wells[1].0, Well::new('A', 2));
        assert_eq!(block.wells[1].1, vec![0.11, 0.13, 0.21, 0.30]);
    }

    #[test]
    fn second_label_block() {
        let block = parse_block(&rows(SHEET), "Green").unwrap();
        assert_eq!(block.len(), 2);
        assert!(block.temperature.is_none());
        assert_eq!(block.wells, vec![(Well::new('A', 1), vec![500.0, 520.0])]);
    }

    #[test]
    fn missing_label_is_an_input_error() {
        let err = parse_block(&rows(SHEET), "Red").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate1.csv");
        std::fs::write(&path, SHEET).unwrap();
        let blocks = read_tecan_csv(&path, &["OD".to_string(), "Green".to_string()]).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "OD");
    }
}
