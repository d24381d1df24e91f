//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs logging
//! - dispatches subcommands (batch analysis, single fits, plots, plates,
//!   simulations)
//! - prints reports/plots and writes outputs

use clap::Parser;
use tracing::info;

use crate::cli::{AnalyzeArgs, Command, FitArgs, ModelArgs, PlateArgs, PlotArgs, SimulateArgs};
use crate::domain::{AnalyzeConfig, FitOptions, GrowthCurve, GrowthParams, ParamName};
use crate::error::AppError;
use crate::io::{LoadOptions, LoadedData, SimulateConfig, load_measurements};

pub mod pipeline;

/// Entry point for the `curveball` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    crate::logging::init(cli.verbose);

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Fit(args) => handle_fit(args),
        Command::Plot(args) => handle_plot(args),
        Command::Plate(args) => handle_plate(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn fit_options(args: &ModelArgs) -> FitOptions {
    FitOptions {
        max_iter: args.max_iter,
        multi_start: !args.single_start,
        ..FitOptions::default()
    }
}

pub fn analyze_config_from_args(args: &AnalyzeArgs) -> AnalyzeConfig {
    AnalyzeConfig {
        folder: args.folder.clone(),
        plate_path: args.plate_folder.join(&args.plate_file),
        blank_strain: args.blank_strain.clone(),
        ref_strain: args.ref_strain.clone(),
        max_time: args.model.max_time,
        label: args.model.label.clone(),
        model_spec: args.model.models,
        subtract_blank: args.subtract_blank,
        plot: args.plot,
        confirm: args.confirm,
        fit: fit_options(&args.model),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analyze_config_from_args(&args);
    let outputs = pipeline::process_folder(&config)?;
    let results: Vec<_> = outputs.into_iter().flat_map(|o| o.results).collect();
    println!("{}", crate::report::format_results_table(&results));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let plate = args.plate.as_deref().map(crate::plate::read_plate).transpose()?;
    let labels = vec![args.model.label.clone()];
    let data = load_measurements(
        &args.file,
        &LoadOptions {
            labels: &labels,
            plate: plate.as_ref(),
            max_time: args.model.max_time,
        },
    )?;

    // Without a plate every well is strain "0", so only skip blanks when a
    // plate says which wells they are.
    let blank = if plate.is_some() { args.blank_strain.as_str() } else { "" };
    let strain = match &args.strain {
        Some(s) => s.clone(),
        None => pipeline::strain_order(&data.measurements, "", blank)
            .into_iter()
            .next()
            .ok_or_else(|| AppError::data("No non-blank strain in the data file."))?,
    };
    let fit = fit_one_strain(&args, &data, &strain)?;
    let best = fit.selection.best();

    println!("{}", crate::report::format_model_diagnostics(&fit.selection));
    println!("{}", crate::report::format_fit_report(best));
    println!(
        "{}",
        crate::report::format_strain_summary(
            &strain,
            &fit.curve,
            best,
            fit.has_lag,
            fit.has_nu,
            fit.growth.as_ref(),
            fit.lag.as_ref(),
        )
    );
    let residuals = crate::report::compute_residuals(&fit.curve, best)?;
    println!(
        "{}",
        crate::report::format_residuals(
            &crate::report::largest_residuals(&residuals, args.top),
            crate::report::rmse(&residuals)
        )
    );

    if !args.no_plot {
        println!(
            "{}",
            crate::plot::render_ascii_plot(&fit.curve, best, args.width, args.height)
        );
    }

    if let Some(reference) = &args.compete_with {
        let ref_fit = fit_one_strain(&args, &data, reference)?;
        let hours = fit.curve.max_time().unwrap_or(best.t_max);
        let comp = crate::competition::compete(best, ref_fit.selection.best(), hours, pipeline::COMPETITION_STEPS)?;
        let w = crate::competition::fitness_ltee(&comp, 0, 1)?;
        println!("Competition {strain} (a) vs {reference} (r) over {hours:.2} h: w = {w:.4}");
        if !args.no_plot {
            println!(
                "{}",
                crate::plot::render_competition(&comp, args.width, args.height)
            );
        }
    }

    if let Some(path) = &args.export_curve {
        let file = crate::io::fit_file(best, &fit.curve, Some(args.file.as_path()), Some(strain.as_str()));
        crate::io::write_fit_json(path, &file)?;
        info!(path = %path.display(), "exported fit");
    }
    Ok(())
}

fn fit_one_strain(args: &FitArgs, data: &LoadedData, strain: &str) -> Result<pipeline::StrainFit, AppError> {
    let measurements: Vec<_> = data.strain_measurements(strain, &args.model.label).collect();
    if measurements.is_empty() {
        return Err(AppError::data(format!(
            "Strain '{strain}' has no '{}' measurements in '{}'.",
            args.model.label,
            args.file.display()
        )));
    }
    let color = measurements[0].color.clone();
    let curve = GrowthCurve::from_measurements(measurements);
    info!(strain, points = curve.len(), "fitting strain");

    pipeline::fit_strain(
        strain,
        &color,
        curve,
        &args.model.models.kinds(),
        &fit_options(&args.model),
    )
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = crate::io::read_fit_json(&args.curve)?;
    println!(
        "{}",
        crate::plot::render_ascii_plot_from_fit_file(&file, args.width, args.height)
    );
    Ok(())
}

fn handle_plate(args: PlateArgs) -> Result<(), AppError> {
    let plate = match (&args.file, &args.output) {
        (_, Some(output)) if args.new => {
            let plate = if args.strains == 0 {
                crate::plate::Plate::ninety_six_wells()
            } else {
                crate::plate::Plate::checkerboard(args.strains)
            };
            if args.long {
                crate::plate::write_long(output, &plate)?;
            } else {
                crate::plate::write_matrix(output, &plate)?;
            }
            info!(path = %output.display(), strains = args.strains, "wrote plate template");
            plate
        }
        (Some(file), _) => crate::plate::read_plate(file)?,
        _ => return Err(AppError::input("Use --file to show a plate or --new --output to create one.")),
    };
    println!("{}", plate.render_grid());
    println!("Strains: {}", plate.strains().join(", "));
    if let Some(well) = &args.well {
        let strain = plate.well_to_strain(well)?;
        println!("{well}: strain {strain} ({})", plate.color_of(strain).unwrap_or_default());
    }
    Ok(())
}

fn simulate_params(args: &SimulateArgs) -> GrowthParams {
    let free = args.model.free_params();
    let lag = args.model.has_lag();
    GrowthParams {
        y0: args.y0,
        r: args.r,
        k: args.k,
        nu: if free.contains(&ParamName::Nu) { args.nu } else { 1.0 },
        q0: lag.then_some(args.q0),
        v: if free.contains(&ParamName::V) {
            Some(args.v)
        } else {
            lag.then_some(args.r)
        },
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = SimulateConfig {
        model: args.model,
        params: simulate_params(&args),
        hours: args.hours,
        interval: args.interval,
        replicates: args.replicates,
        noise: args.noise,
        seed: args.seed,
        strain: args.strain.clone(),
        label: args.label.clone(),
    };
    let measurements = crate::io::simulate_measurements(&config)?;
    crate::io::write_tidy_csv(&args.output, &measurements)?;
    info!(
        path = %args.output.display(),
        model = config.model.id(),
        rows = measurements.len(),
        "wrote simulated data"
    );
    Ok(())
}
