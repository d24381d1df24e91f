//! Microplate templates: which strain grows in which well.
//!
//! Two on-disk formats are understood:
//!
//! - **long**: a CSV with `Row,Col,Strain,Color` columns (one line per well)
//! - **matrix**: one line per plate row, strain names separated by `, `
//!
//! Matrix templates carry no colors; strains get colors from the Set1
//! palette in order of first appearance, and strain `0` (blank) is white.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_COLOR, DEFAULT_STRAIN, ROW_LETTERS, Well};
use crate::error::AppError;

/// ColorBrewer Set1.
pub const SET1: [&str; 9] = [
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#ffff33", "#a65628", "#f781bf", "#999999",
];
/// Color of the blank strain.
pub const BLANK_COLOR: &str = "#ffffff";
/// Name of the blank strain.
pub const BLANK_STRAIN: &str = "0";

/// One well of a plate template (long-format row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateWell {
    #[serde(rename = "Row")]
    pub row: char,
    #[serde(rename = "Col")]
    pub col: u32,
    #[serde(rename = "Strain")]
    pub strain: String,
    #[serde(rename = "Color")]
    pub color: String,
}

impl PlateWell {
    pub fn well(&self) -> Well {
        Well::new(self.row, self.col)
    }
}

/// A plate template, wells stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plate {
    pub rows: usize,
    pub cols: usize,
    wells: Vec<PlateWell>,
}

impl Plate {
    /// Blank 8×12 plate (every well holds strain `0`).
    pub fn ninety_six_wells() -> Self {
        Self::from_strain_rows(vec![vec![BLANK_STRAIN.to_string(); 12]; 8])
    }

    /// 8×12 plate with a blank border and `nstrains` strains alternating
    /// over the inner wells.
    pub fn checkerboard(nstrains: usize) -> Self {
        let nstrains = nstrains.max(1);
        let (rows, cols) = (8, 12);
        let strains = (0..rows)
            .map(|i| {
                (0..cols)
                    .map(|j| {
                        if i == 0 || j == 0 || i == rows - 1 || j == cols - 1 {
                            BLANK_STRAIN.to_string()
                        } else {
                            ((i + j) % nstrains + 1).to_string()
                        }
                    })
                    .collect()
            })
            .collect();
        Self::from_strain_rows(strains)
    }

    /// Build a plate from a grid of strain names, assigning palette colors.
    pub fn from_strain_rows(strains: Vec<Vec<String>>) -> Self {
        let rows = strains.len();
        let cols = strains.iter().map(Vec::len).max().unwrap_or(0);
        let mut wells = Vec::with_capacity(rows * cols);

        for (i, line) in strains.into_iter().enumerate() {
            let row = ROW_LETTERS.chars().nth(i).unwrap_or('?');
            for (j, strain) in line.into_iter().enumerate() {
                wells.push(PlateWell {
                    row,
                    col: j as u32 + 1,
                    strain,
                    color: String::new(),
                });
            }
        }
        fill_colors(&mut wells);
        Self { rows, cols, wells }
    }

    pub fn wells(&self) -> &[PlateWell] {
        &self.wells
    }

    pub fn get(&self, well: &Well) -> Option<&PlateWell> {
        self.wells.iter().find(|w| w.row == well.row && w.col == well.col)
    }

    /// Strain in a well given by name, e.g. `"B7"`.
    pub fn well_to_strain(&self, well: &str) -> Result<&str, AppError> {
        let parsed: Well = well.parse().map_err(AppError::input)?;
        self.get(&parsed)
            .map(|w| w.strain.as_str())
            .ok_or_else(|| AppError::input(format!("Well {parsed} is not on the plate.")))
    }

    /// Distinct strains in order of first appearance (row-major).
    pub fn strains(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for w in &self.wells {
            if !out.contains(&w.strain) {
                out.push(w.strain.clone());
            }
        }
        out
    }

    /// Color assigned to a strain.
    pub fn color_of(&self, strain: &str) -> Option<&str> {
        self.wells
            .iter()
            .find(|w| w.strain == strain)
            .map(|w| w.color.as_str())
    }

    /// Matrix representation: one line per row, strains joined by `, `.
    pub fn to_matrix_csv(&self) -> String {
        let mut out = String::new();
        for chunk in self.wells.chunks(self.cols.max(1)) {
            let names: Vec<&str> = chunk.iter().map(|w| w.strain.as_str()).collect();
            out.push_str(&names.join(", "));
            out.push('\n');
        }
        out
    }

    /// Terminal rendering with row letters and column numbers.
    pub fn render_grid(&self) -> String {
        let width = self
            .wells
            .iter()
            .map(|w| w.strain.chars().count())
            .max()
            .unwrap_or(1)
            .max(2);

        let mut out = String::from("  ");
        for c in 1..=self.cols {
            out.push_str(&format!(" {c:>width$}"));
        }
        out.push('\n');
        for chunk in self.wells.chunks(self.cols.max(1)) {
            let row = chunk.first().map_or('?', |w| w.row);
            out.push_str(&format!("{row} "));
            for w in chunk {
                out.push_str(&format!(" {:>width$}", w.strain));
            }
            out.push('\n');
        }
        out
    }
}

/// Give wells without a color their strain's color.
///
/// A strain keeps a color listed for any of its wells; otherwise it takes the
/// Set1 entry at its rank among all strains in row-major order (the blank
/// strain counts toward the rank but is always white).
fn fill_colors(wells: &mut [PlateWell]) {
    let mut order: Vec<&str> = Vec::new();
    let mut given: HashMap<&str, &str> = HashMap::new();
    for w in wells.iter() {
        if !order.contains(&w.strain.as_str()) {
            order.push(&w.strain);
        }
        if !w.color.is_empty() {
            given.entry(&w.strain).or_insert(&w.color);
        }
    }
    let colors: HashMap<String, String> = order
        .iter()
        .enumerate()
        .map(|(i, &strain)| {
            let color = given
                .get(strain)
                .map_or_else(|| palette_color(strain, i), |c| c.to_string());
            (strain.to_string(), color)
        })
        .collect();
    for w in wells.iter_mut().filter(|w| w.color.is_empty()) {
        if let Some(c) = colors.get(&w.strain) {
            w.color = c.clone();
        }
    }
}

fn palette_color(strain: &str, index: usize) -> String {
    if strain == BLANK_STRAIN {
        BLANK_COLOR.to_string()
    } else {
        SET1[index % SET1.len()].to_string()
    }
}

/// Read a plate template, detecting the long or matrix format.
pub fn read_plate(path: &Path) -> Result<Plate, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read plate file '{}': {e}", path.display())))?;
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let header: Vec<String> = first
        .split(',')
        .map(|c| c.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();

    if header.iter().any(|c| c == "strain") {
        parse_long(&text)
    } else {
        parse_matrix(&text)
    }
}

/// Parse a long-format (`Row,Col,Strain[,Color]`) template.
pub fn parse_long(text: &str) -> Result<Plate, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read plate headers: {e}")))?
        .clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    let (Some(row_idx), Some(col_idx), Some(strain_idx)) = (find("row"), find("col"), find("strain")) else {
        return Err(AppError::input("Plate file needs `Row`, `Col` and `Strain` columns."));
    };
    let color_idx = find("color");

    let mut wells: Vec<PlateWell> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| AppError::input(format!("Plate line {line}: {e}")))?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();

        let well: Well = format!("{}{}", cell(row_idx), cell(col_idx))
            .parse()
            .map_err(|e| AppError::input(format!("Plate line {line}: {e}")))?;
        wells.push(PlateWell {
            row: well.row,
            col: well.col,
            strain: cell(strain_idx).to_string(),
            color: color_idx.map(cell).unwrap_or_default().to_string(),
        });
    }
    if wells.is_empty() {
        return Err(AppError::input("Plate file has no wells."));
    }

    wells.sort_by_key(|w| (w.row, w.col));
    if let Some(pair) = wells.windows(2).find(|p| p[0].well() == p[1].well()) {
        return Err(AppError::input(format!("Plate file lists well {} more than once.", pair[0].well())));
    }
    let rows = wells.iter().filter_map(|w| w.well().row_index()).max().unwrap_or(0) + 1;
    let cols = wells.iter().map(|w| w.col as usize).max().unwrap_or(0);
    fill_colors(&mut wells);

    if wells.len() != rows * cols {
        return Err(AppError::input(format!(
            "Plate file describes {} wells, expected a full {rows}x{cols} grid.",
            wells.len()
        )));
    }
    Ok(Plate { rows, cols, wells })
}

/// Parse a matrix-format template.
pub fn parse_matrix(text: &str) -> Result<Plate, AppError> {
    let strains: Vec<Vec<String>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split(',').map(|s| s.trim().to_string()).collect())
        .collect();
    if strains.is_empty() {
        return Err(AppError::input("Plate file is empty."));
    }
    let cols = strains[0].len();
    if let Some(i) = strains.iter().position(|r| r.len() != cols) {
        return Err(AppError::input(format!(
            "Plate row {} has {} wells, expected {cols}.",
            i + 1,
            strains[i].len()
        )));
    }
    if strains.len() > ROW_LETTERS.len() {
        return Err(AppError::input("Plate has more rows than row letters."));
    }
    Ok(Plate::from_strain_rows(strains))
}

/// Write a plate in matrix format.
pub fn write_matrix(path: &Path, plate: &Plate) -> Result<(), AppError> {
    fs::write(path, plate.to_matrix_csv())
        .map_err(|e| AppError::input(format!("Failed to write plate '{}': {e}", path.display())))
}

/// Write a plate in long (`Row,Col,Strain,Color`) format.
pub fn write_long(path: &Path, plate: &Plate) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create plate '{}': {e}", path.display())))?;
    for w in plate.wells() {
        writer
            .serialize(w)
            .map_err(|e| AppError::input(format!("Failed to write plate row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write plate '{}': {e}", path.display())))
}

/// Strain and color for a well, falling back to the no-plate defaults.
pub fn lookup(plate: Option<&Plate>, well: &Well) -> Option<(String, String)> {
    match plate {
        Some(p) => p.get(well).map(|w| (w.strain.clone(), w.color.clone())),
        None => Some((DEFAULT_STRAIN.to_string(), DEFAULT_COLOR.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_format_assigns_colors_in_order() {
        let plate = parse_matrix("0, 1, 2\n2, 1, 0\n").unwrap();
        assert_eq!((plate.rows, plate.cols), (2, 3));
        assert_eq!(plate.strains(), vec!["0", "1", "2"]);
        assert_eq!(plate.color_of("0"), Some(BLANK_COLOR));
        assert_eq!(plate.color_of("1"), Some(SET1[1]));
        assert_eq!(plate.color_of("2"), Some(SET1[2]));
        assert_eq!(plate.well_to_strain("B1").unwrap(), "2");
        assert_eq!(plate.well_to_strain("a2").unwrap(), "1");
        assert!(plate.well_to_strain("C1").is_err());
        assert_eq!(plate.to_matrix_csv(), "0, 1, 2\n2, 1, 0\n");
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        assert!(parse_matrix("0, 1\n0\n").is_err());
        assert!(parse_matrix("\n").is_err());
    }

    #[test]
    fn long_format_keeps_given_colors() {
        let text = "Row,Col,Strain,Color\nA,1,0,#ffffff\nA,2,1,#ff0000\nB,1,1,#ff0000\nB,2,G,\n";
        let plate = parse_long(text).unwrap();
        assert_eq!((plate.rows, plate.cols), (2, 2));
        assert_eq!(plate.color_of("1"), Some("#ff0000"));
        assert_eq!(plate.color_of("G"), Some(SET1[2]));
        assert_eq!(plate.well_to_strain("B2").unwrap(), "G");
    }

    #[test]
    fn both_formats_pick_the_same_colors() {
        let matrix = parse_matrix("0, 1\n2, 1\n").unwrap();
        let long = parse_long("Row,Col,Strain,Color\nA,1,0,#ffffff\nA,2,1,\nB,1,2,\nB,2,1,\n").unwrap();
        assert_eq!(long, matrix);
        assert_eq!(long.color_of("1"), Some(SET1[1]));
        assert_eq!(long.color_of("2"), Some(SET1[2]));
    }

    #[test]
    fn long_format_rejects_duplicate_wells() {
        // A1 twice and no A2: the count matches a 2x2 grid.
        let text = "Row,Col,Strain\nA,1,0\nA,1,1\nB,1,1\nB,2,0\n";
        let err = parse_long(text).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("A1"));
    }

    #[test]
    fn long_format_requires_full_grid() {
        let text = "Row,Col,Strain\nA,1,0\nB,2,1\n";
        assert_eq!(parse_long(text).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn templates_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let plate = Plate::checkerboard(2);
        assert_eq!(plate.wells().len(), 96);
        assert_eq!(plate.strains(), vec!["0", "1", "2"]);

        let matrix = dir.path().join("checkerboard.csv");
        write_matrix(&matrix, &plate).unwrap();
        assert_eq!(read_plate(&matrix).unwrap(), plate);

        let long = dir.path().join("long.csv");
        write_long(&long, &plate).unwrap();
        assert_eq!(read_plate(&long).unwrap(), plate);
    }

    #[test]
    fn grid_rendering() {
        let plate = parse_matrix("0, 1\n1, 0\n").unwrap();
        assert_eq!(plate.render_grid(), "    1  2\nA   0  1\nB   1  0\n");
        let blank = Plate::ninety_six_wells();
        assert_eq!(blank.strains(), vec!["0"]);
    }
}
