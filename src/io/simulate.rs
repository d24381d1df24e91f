//! Synthetic growth data.
//!
//! Samples a model curve on a regular time grid, adds Gaussian noise per
//! replicate well, and writes the result as a tidy CSV that `curveball` can
//! read back. Generation is fully determined by the seed.

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{GrowthParams, Measurement, ModelKind, ROW_LETTERS, Well};
use crate::error::AppError;
use crate::models::predict;

/// Wells per plate row when laying out replicates.
const PLATE_WIDTH: u32 = 12;

/// Parameters of a synthetic experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateConfig {
    pub model: ModelKind,
    pub params: GrowthParams,
    pub hours: f64,
    /// Sampling interval in hours.
    pub interval: f64,
    pub replicates: usize,
    /// Standard deviation of the additive measurement noise.
    pub noise: f64,
    pub seed: u64,
    pub strain: String,
    pub label: String,
}

/// Generate noisy replicate measurements from the model.
pub fn simulate_measurements(config: &SimulateConfig) -> Result<Vec<Measurement>, AppError> {
    if !(config.hours.is_finite() && config.hours > 0.0) {
        return Err(AppError::input("Simulation hours must be > 0."));
    }
    if !(config.interval.is_finite() && config.interval > 0.0) {
        return Err(AppError::input("Sampling interval must be > 0."));
    }
    if config.replicates == 0 || config.replicates > ROW_LETTERS.len() * PLATE_WIDTH as usize {
        return Err(AppError::input("Replicate count must fit on a plate."));
    }
    let noise = Normal::new(0.0, config.noise)
        .map_err(|e| AppError::input(format!("Invalid noise level {}: {e}", config.noise)))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let steps = (config.hours / config.interval + 1e-9).floor() as usize + 1;
    let mut out = Vec::with_capacity(steps * config.replicates);
    for step in 0..steps {
        let t = step as f64 * config.interval;
        let y = predict(config.model, t, &config.params);
        if !y.is_finite() {
            return Err(AppError::numeric(format!("Model is not finite at t={t:.3} h.")));
        }
        for rep in 0..config.replicates {
            out.push(Measurement {
                label: config.label.clone(),
                cycle: step as u32 + 1,
                time: t,
                temperature: None,
                well: replicate_well(rep),
                strain: config.strain.clone(),
                color: crate::domain::DEFAULT_COLOR.to_string(),
                value: y + noise.sample(&mut rng),
            });
        }
    }
    Ok(out)
}

fn replicate_well(rep: usize) -> Well {
    let row = ROW_LETTERS
        .chars()
        .nth(rep / PLATE_WIDTH as usize)
        .unwrap_or('A');
    Well::new(row, (rep % PLATE_WIDTH as usize) as u32 + 1)
}

/// Write measurements as a tidy CSV (`Cycle Nr.,Time,Well,Strain,Color,<label>`).
pub fn write_tidy_csv(path: &Path, measurements: &[Measurement]) -> Result<(), AppError> {
    let label = measurements.first().map_or("OD", |m| m.label.as_str());
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create CSV '{}': {e}", path.display())))?;
    let wrap = |e: csv::Error| AppError::input(format!("Failed to write CSV '{}': {e}", path.display()));

    writer
        .write_record(["Cycle Nr.", "Time", "Well", "Strain", "Color", label])
        .map_err(wrap)?;
    for m in measurements {
        writer
            .write_record([
                m.cycle.to_string(),
                m.time.to_string(),
                m.well.to_string(),
                m.strain.clone(),
                m.color.clone(),
                m.value.to_string(),
            ])
            .map_err(wrap)?;
    }
    writer.flush().map_err(|e| AppError::input(format!("Failed to write CSV '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GrowthCurve;
    use crate::io::ingest::{LoadOptions, load_measurements};

    fn config() -> SimulateConfig {
        SimulateConfig {
            model: ModelKind::BaranyiRoberts,
            params: GrowthParams {
                y0: 0.05,
                r: 1.0,
                k: 0.9,
                nu: 1.5,
                q0: Some(0.2),
                v: Some(1.5),
            },
            hours: 12.0,
            interval: 0.5,
            replicates: 3,
            noise: 0.005,
            seed: 7,
            strain: "1".to_string(),
            label: "OD".to_string(),
        }
    }

    #[test]
    fn seeded_simulation_is_reproducible() {
        let a = simulate_measurements(&config()).unwrap();
        let b = simulate_measurements(&config()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 25 * 3);
        assert_eq!(a[2].well, Well::new('A', 3));
        assert_eq!(a.last().unwrap().time, 12.0);

        let c = simulate_measurements(&SimulateConfig { seed: 8, ..config() }).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn noiseless_data_follows_the_model() {
        let m = simulate_measurements(&SimulateConfig { noise: 0.0, ..config() }).unwrap();
        let curve = GrowthCurve::from_measurements(&m);
        assert_eq!(curve.len(), 25);
        let cfg = config();
        for (t, y) in curve.time.iter().zip(&curve.value) {
            assert!((y - predict(cfg.model, *t, &cfg.params)).abs() < 1e-12);
        }
    }

    #[test]
    fn written_csv_is_readable_as_tidy_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.csv");
        let m = simulate_measurements(&config()).unwrap();
        write_tidy_csv(&path, &m).unwrap();

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
        assert_eq!(data.measurements.len(), m.len());
        assert_eq!(data.measurements[4].strain, "1");
        assert_eq!(data.measurements[4].value, m[4].value);
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(simulate_measurements(&SimulateConfig { hours: 0.0, ..config() }).is_err());
        assert!(simulate_measurements(&SimulateConfig { replicates: 0, ..config() }).is_err());
        assert!(simulate_measurements(&SimulateConfig { noise: -1.0, ..config() }).is_err());
    }
}
