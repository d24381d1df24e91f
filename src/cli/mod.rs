//! Command-line parsing for the growth-curve analyzer.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code. Every option can also be set through a
//! `CURVEBALL_*` environment variable (or a `.env` file).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ModelKind, ModelSpec};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "curveball",
    version,
    about = "Analyze microbial growth curves with ecological and evolutionary models"
)]
pub struct Cli {
    /// Verbose (debug) logging.
    #[arg(short, long, global = true, env = "CURVEBALL_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every strain of every data file in a folder and write `curveball.csv`.
    Analyze(AnalyzeArgs),
    /// Fit one strain of one data file and print a detailed report.
    Fit(FitArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
    /// Show a plate template or create a new one.
    Plate(PlateArgs),
    /// Write synthetic growth data sampled from a model.
    Simulate(SimulateArgs),
}

/// Options shared by the fitting subcommands.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Which model(s) to fit.
    #[arg(long = "models", value_enum, default_value_t = ModelSpec::Auto, env = "CURVEBALL_MODELS")]
    pub models: ModelSpec,

    /// Measurement label to fit (e.g. OD).
    #[arg(long, default_value = "OD", env = "CURVEBALL_LABEL")]
    pub label: String,

    /// Only use measurements taken before this time (hours).
    #[arg(long, env = "CURVEBALL_MAX_TIME")]
    pub max_time: Option<f64>,

    /// Maximum optimizer iterations per start.
    #[arg(long, default_value_t = 200, env = "CURVEBALL_MAX_ITER")]
    pub max_iter: usize,

    /// Fit from the data-driven guess only (skip the multi-start grid).
    #[arg(long, env = "CURVEBALL_SINGLE_START")]
    pub single_start: bool,
}

/// Options for batch analysis.
#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Folder with plate-reader data files.
    #[arg(short, long, default_value = ".", env = "CURVEBALL_FOLDER")]
    pub folder: PathBuf,

    /// Folder with plate templates.
    #[arg(long, default_value = "plate_templates", env = "CURVEBALL_PLATE_FOLDER")]
    pub plate_folder: PathBuf,

    /// Plate template file name (inside the plate folder).
    #[arg(long, default_value = "checkerboard.csv", env = "CURVEBALL_PLATE_FILE")]
    pub plate_file: String,

    /// Strain of blank wells.
    #[arg(long, default_value = "0", env = "CURVEBALL_BLANK_STRAIN")]
    pub blank_strain: String,

    /// Reference strain for competitions.
    #[arg(long, default_value = "1", env = "CURVEBALL_REF_STRAIN")]
    pub ref_strain: String,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Write SVG plots next to each data file.
    #[arg(long, env = "CURVEBALL_PLOT")]
    pub plot: bool,

    /// Subtract the per-cycle mean of blank wells before fitting.
    #[arg(long, env = "CURVEBALL_SUBTRACT_BLANK")]
    pub subtract_blank: bool,

    /// Show the plate and ask for confirmation before processing.
    #[arg(long, env = "CURVEBALL_CONFIRM")]
    pub confirm: bool,
}

/// Options for fitting a single strain.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Data file (tidy or Tecan CSV).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Plate template (without one, every well belongs to strain 0).
    #[arg(long, env = "CURVEBALL_PLATE")]
    pub plate: Option<PathBuf>,

    /// Strain to fit (defaults to the first non-blank strain).
    #[arg(long, env = "CURVEBALL_STRAIN")]
    pub strain: Option<String>,

    /// Strain of blank wells.
    #[arg(long, default_value = "0", env = "CURVEBALL_BLANK_STRAIN")]
    pub blank_strain: String,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Also fit this reference strain and simulate a competition against it.
    #[arg(long, value_name = "STRAIN")]
    pub compete_with: Option<String>,

    /// Export the best fit (params + fitted grid) to JSON.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,

    /// Number of largest residuals to list.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for plotting a saved fit.
#[derive(Debug, Args)]
pub struct PlotArgs {
    /// Fit JSON file produced by `curveball fit --export-curve`.
    #[arg(long, value_name = "JSON")]
    pub curve: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for showing or creating plate templates.
#[derive(Debug, Args)]
pub struct PlateArgs {
    /// Plate template to show.
    #[arg(long, conflicts_with = "new")]
    pub file: Option<PathBuf>,

    /// Create a checkerboard template.
    #[arg(long, requires = "output")]
    pub new: bool,

    /// Number of non-blank strains on the new template (0 for a blank plate).
    #[arg(long, default_value_t = 2)]
    pub strains: usize,

    /// Where to write the new template.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write the long `Row,Col,Strain,Color` format instead of the matrix.
    #[arg(long)]
    pub long: bool,

    /// Print the strain of one well (e.g. `B7`).
    #[arg(long)]
    pub well: Option<String>,
}

/// Options for synthetic data.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Output tidy CSV.
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = ModelKind::BaranyiRoberts)]
    pub model: ModelKind,

    #[arg(long, default_value_t = 0.05)]
    pub y0: f64,

    #[arg(long, default_value_t = 1.0)]
    pub r: f64,

    #[arg(long = "k", default_value_t = 1.0)]
    pub k: f64,

    #[arg(long, default_value_t = 1.0)]
    pub nu: f64,

    #[arg(long, default_value_t = 0.1)]
    pub q0: f64,

    #[arg(long, default_value_t = 1.0)]
    pub v: f64,

    /// Duration of the run (hours).
    #[arg(long, default_value_t = 16.0)]
    pub hours: f64,

    /// Sampling interval (hours).
    #[arg(long, default_value_t = 0.25)]
    pub interval: f64,

    #[arg(long, default_value_t = 3)]
    pub replicates: usize,

    /// Standard deviation of Gaussian measurement noise.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    #[arg(long, default_value_t = 42, env = "CURVEBALL_SEED")]
    pub seed: u64,

    #[arg(long, default_value = "1")]
    pub strain: String,

    #[arg(long, default_value = "OD")]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_defaults() {
        let cli = Cli::try_parse_from(["curveball", "analyze", "--folder", "data", "--plot"]).unwrap();
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.folder, PathBuf::from("data"));
        assert_eq!(args.plate_file, "checkerboard.csv");
        assert_eq!(args.ref_strain, "1");
        assert_eq!(args.model.models, ModelSpec::Auto);
        assert!(args.plot && !args.confirm);
        assert!(args.model.max_time.is_none());
    }

    #[test]
    fn simulate_parses_model_kind() {
        let cli = Cli::try_parse_from([
            "curveball", "-v", "simulate", "-o", "sim.csv", "--model", "baranyi-roberts-nu1", "--k", "0.8",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.model, ModelKind::BaranyiRobertsNu1);
        assert_eq!(args.k, 0.8);
    }

    #[test]
    fn plate_new_requires_output() {
        assert!(Cli::try_parse_from(["curveball", "plate", "--new"]).is_err());
        assert!(Cli::try_parse_from(["curveball", "plate", "--new", "--output", "p.csv"]).is_ok());
    }
}
