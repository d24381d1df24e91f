//! Shared analysis pipeline used by the `analyze` and `fit` subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! ingest -> blank handling -> per-strain fit/selection -> hypotheses ->
//! derived quantities -> competitions -> results rows
//!
//! The subcommands can then focus on presentation (printing vs CSV/SVG files).

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::competition::{compete, fitness_ltee};
use crate::domain::{AnalyzeConfig, FitOptions, GrowthCurve, Measurement, ModelKind, StrainResult};
use crate::error::AppError;
use crate::fit::{
    DEFAULT_ALPHA, FitSelection, LagEstimate, MaxGrowth, find_lag, find_max_growth, fit_models, has_lag, has_nu,
};
use crate::io::{FileHandler, LoadOptions, LoadedData, RESULTS_FILE_NAME, file_handler, load_measurements};
use crate::plate::{Plate, read_plate};

/// Integration steps of a simulated competition.
pub const COMPETITION_STEPS: usize = 1000;

/// Everything computed for one strain of one file.
#[derive(Debug, Clone)]
pub struct StrainFit {
    pub strain: String,
    pub color: String,
    pub curve: GrowthCurve,
    pub selection: FitSelection,
    pub has_lag: Option<bool>,
    pub has_nu: Option<bool>,
    pub growth: Option<MaxGrowth>,
    pub lag: Option<LagEstimate>,
}

/// All outputs of processing a single data file.
#[derive(Debug, Clone)]
pub struct FileOutput {
    pub path: PathBuf,
    pub data: LoadedData,
    pub fits: Vec<StrainFit>,
    pub results: Vec<StrainResult>,
}

/// Load the plate template for a batch run.
///
/// A missing default `checkerboard.csv` falls back to the built-in two-strain
/// checkerboard; any other missing template is an error.
pub fn load_plate(config: &AnalyzeConfig) -> Result<Plate, AppError> {
    if !config.plate_path.exists() && config.plate_path.file_name().is_some_and(|n| n == "checkerboard.csv") {
        warn!(
            path = %config.plate_path.display(),
            "plate template not found, using the built-in checkerboard"
        );
        return Ok(Plate::checkerboard(2));
    }
    read_plate(&config.plate_path)
}

/// Data files in `folder` that have a handler, sorted by name.
pub fn list_data_files(folder: &Path) -> Result<Vec<(PathBuf, FileHandler)>, AppError> {
    let entries = fs::read_dir(folder)
        .map_err(|e| AppError::input(format!("Failed to read folder '{}': {e}", folder.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AppError::input(format!("Failed to read folder '{}': {e}", folder.display())))?
            .path();
        // Our own output lives in the same folder.
        if !path.is_file() || path.file_name().is_some_and(|n| n == RESULTS_FILE_NAME) {
            continue;
        }
        if let Some(handler) = file_handler(&path) {
            files.push((path, handler));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Ask the user to confirm the plate on stdin.
fn confirm_plate(plate: &Plate) -> Result<bool, AppError> {
    println!("{}", plate.render_grid());
    print!("Is this the plate you wanted? [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write prompt: {e}")))?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| AppError::input(format!("Failed to read answer: {e}")))?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Process every data file in the folder and write the results CSV.
pub fn process_folder(config: &AnalyzeConfig) -> Result<Vec<FileOutput>, AppError> {
    let plate = load_plate(config)?;
    info!(strains = ?plate.strains(), "plate loaded");

    if config.confirm && !confirm_plate(&plate)? {
        return Err(AppError::input("Plate not confirmed, aborting."));
    }

    let files = list_data_files(&config.folder)?;
    if files.is_empty() {
        return Err(AppError::input(format!(
            "No data files with a known handler in '{}'.",
            config.folder.display()
        )));
    }

    let mut outputs = Vec::new();
    for (path, handler) in files {
        if let FileHandler::Unsupported(why) = handler {
            warn!(path = %path.display(), "skipping unsupported file: {why}");
            continue;
        }
        match process_file(&path, &plate, config) {
            Ok(out) => outputs.push(out),
            Err(err) => warn!(path = %path.display(), "skipping file: {}", err.message()),
        }
    }

    let results: Vec<StrainResult> = outputs.iter().flat_map(|o| o.results.iter().cloned()).collect();
    let out_path = config.folder.join(RESULTS_FILE_NAME);
    crate::io::write_results_csv(&out_path, &results)?;
    info!(path = %out_path.display(), rows = results.len(), "wrote results");
    Ok(outputs)
}

/// Subtract the per-cycle mean of blank wells from every other well.
pub fn subtract_blank(measurements: &mut [Measurement], blank_strain: &str) {
    let mut sums: HashMap<(String, u32), (f64, usize)> = HashMap::new();
    for m in measurements.iter().filter(|m| m.strain == blank_strain) {
        let e = sums.entry((m.label.clone(), m.cycle)).or_insert((0.0, 0));
        e.0 += m.value;
        e.1 += 1;
    }
    if sums.is_empty() {
        warn!(blank_strain, "no blank wells to subtract");
        return;
    }
    let mut corrected = 0usize;
    for m in measurements.iter_mut().filter(|m| m.strain != blank_strain) {
        if let Some((sum, n)) = sums.get(&(m.label.clone(), m.cycle)) {
            m.value -= sum / *n as f64;
            corrected += 1;
        }
    }
    if corrected == 0 {
        warn!(blank_strain, "blank wells share no cycle with other wells, nothing subtracted");
    }
}

/// Non-blank strains in first-appearance order, with the reference first.
pub fn strain_order(measurements: &[Measurement], ref_strain: &str, blank_strain: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for m in measurements {
        if m.strain != blank_strain && !order.contains(&m.strain) {
            order.push(m.strain.clone());
        }
    }
    if let Some(i) = order.iter().position(|s| s == ref_strain) {
        let r = order.remove(i);
        order.insert(0, r);
    }
    order
}

/// Fit all requested models to one strain and derive its quantities.
pub fn fit_strain(
    strain: &str,
    color: &str,
    curve: GrowthCurve,
    kinds: &[ModelKind],
    opts: &FitOptions,
) -> Result<StrainFit, AppError> {
    let selection = fit_models(&curve, kinds, opts)?;
    let best = selection.best();
    let growth = find_max_growth(best)
        .map_err(|e| warn!(strain, "max growth: {}", e.message()))
        .ok();
    let lag = find_lag(best).map_err(|e| warn!(strain, "lag: {}", e.message())).ok();
    debug!(strain, model = best.model.id(), bic = best.quality.bic, "strain fitted");

    Ok(StrainFit {
        strain: strain.to_string(),
        color: color.to_string(),
        has_lag: has_lag(&selection.fits, DEFAULT_ALPHA),
        has_nu: has_nu(&selection.fits, DEFAULT_ALPHA),
        curve,
        selection,
        growth,
        lag,
    })
}

/// Load one data file, fit each strain, and build its result rows.
pub fn process_file(path: &Path, plate: &Plate, config: &AnalyzeConfig) -> Result<FileOutput, AppError> {
    let labels = vec![config.label.clone()];
    let mut data = load_measurements(
        path,
        &LoadOptions {
            labels: &labels,
            plate: Some(plate),
            max_time: config.max_time,
        },
    )?;
    for e in &data.row_errors {
        warn!(path = %path.display(), line = e.line, "{}", e.message);
    }

    if config.subtract_blank {
        subtract_blank(&mut data.measurements, &config.blank_strain);
    }
    let strains = strain_order(&data.measurements, &config.ref_strain, &config.blank_strain);
    if strains.first() != Some(&config.ref_strain) {
        return Err(AppError::data(format!(
            "Reference strain '{}' not found in '{}'.",
            config.ref_strain,
            path.display()
        )));
    }

    let kinds = config.model_spec.kinds();
    let fits: Vec<StrainFit> = strains
        .par_iter()
        .filter_map(|strain| {
            let mut iter = data.strain_measurements(strain, &config.label).peekable();
            let color = iter
                .peek()
                .map(|m| m.color.clone())
                .filter(|c| !c.is_empty())
                .or_else(|| plate.color_of(strain).map(str::to_string))
                .unwrap_or_default();
            let curve = GrowthCurve::from_measurements(iter);
            match fit_strain(strain, &color, curve, &kinds, &config.fit) {
                Ok(fit) => Some(fit),
                Err(err) => {
                    warn!(path = %path.display(), strain = %strain, "fit failed: {}", err.message());
                    None
                }
            }
        })
        .collect();

    let Some(reference) = fits.first().filter(|f| f.strain == config.ref_strain) else {
        return Err(AppError::data(format!(
            "Reference strain '{}' could not be fitted in '{}'.",
            config.ref_strain,
            path.display()
        )));
    };
    let hours = data.max_time().unwrap_or(0.0);
    let file = path.display().to_string();

    let mut results = Vec::with_capacity(fits.len());
    for fit in &fits {
        let w = if fit.strain == config.ref_strain {
            Some(1.0)
        } else {
            compete(fit.selection.best(), reference.selection.best(), hours, COMPETITION_STEPS)
                .and_then(|comp| fitness_ltee(&comp, 0, 1))
                .map_err(|e| warn!(strain = %fit.strain, "competition: {}", e.message()))
                .ok()
        };
        results.push(strain_result(&file, fit, w));
    }

    if config.plot {
        write_plots(path, &fits, reference, hours);
    }

    info!(path = %path.display(), strains = fits.len(), "file processed");
    Ok(FileOutput {
        path: path.to_path_buf(),
        data,
        fits,
        results,
    })
}

/// Flatten a strain fit into one results row.
pub fn strain_result(file: &str, fit: &StrainFit, w: Option<f64>) -> StrainResult {
    let best = fit.selection.best();
    let p = &best.params;
    StrainResult {
        file: file.to_string(),
        strain: fit.strain.clone(),
        model: best.model.id().to_string(),
        bic: best.quality.bic,
        aic: best.quality.aic,
        y0: p.y0,
        k: p.k,
        r: p.r,
        nu: p.nu,
        q0: p.q0.unwrap_or(0.0),
        v: p.v.unwrap_or(0.0),
        max_growth_rate: fit.growth.as_ref().map_or(f64::NAN, |g| g.mu),
        lag: fit.lag.as_ref().map_or(best.lag, |l| l.lag),
        has_lag: fit.has_lag,
        has_nu: fit.has_nu,
        w,
    }
}

/// SVG plots next to the data file; failures are logged, not fatal.
fn write_plots(path: &Path, fits: &[StrainFit], reference: &StrainFit, hours: f64) {
    let stem = path.with_extension("");
    let stem = stem.display();

    let overview: Vec<(GrowthCurve, String)> = fits.iter().map(|f| (f.curve.clone(), f.color.clone())).collect();
    let overview_path = PathBuf::from(format!("{stem}_strains.svg"));
    if let Err(e) = crate::plot::write_strains_svg(&overview_path, &overview) {
        warn!(path = %overview_path.display(), "{}", e.message());
    }

    for fit in fits {
        let svg = PathBuf::from(format!("{stem}_strain_{}.svg", fit.strain));
        if let Err(e) = crate::plot::write_fit_svg(&svg, &fit.curve, fit.selection.best(), &fit.color) {
            warn!(path = %svg.display(), "{}", e.message());
        }
        if fit.strain == reference.strain {
            continue;
        }
        let svg = PathBuf::from(format!("{stem}_{}_vs_{}.svg", fit.strain, reference.strain));
        let drawn = compete(fit.selection.best(), reference.selection.best(), hours, COMPETITION_STEPS)
            .and_then(|comp| crate::plot::write_competition_svg(&svg, &comp, [fit.color.as_str(), reference.color.as_str()]));
        if let Err(e) = drawn {
            warn!(path = %svg.display(), "{}", e.message());
        }
    }
}
