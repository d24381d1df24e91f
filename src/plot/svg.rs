//! SVG figures written next to the processed data files.
//!
//! Figures are drawn with Plotters' SVG backend. Only lines, circles and
//! rectangles are used, so no font backend is needed.
//!
//! - per-strain fit: replicate means (circles, with ±std whiskers) and the
//!   fitted curve
//! - per-file strains overview: the mean curve of every strain in its plate
//!   color
//! - competition: assay and reference densities over time

use std::path::Path;

use plotters::prelude::*;

use crate::competition::Competition;
use crate::domain::{FitResult, GrowthCurve};
use crate::error::AppError;
use crate::math::linspace;
use crate::models::predict;

const SIZE: (u32, u32) = (640, 480);
const MARGIN: u32 = 24;
const CURVE_POINTS: usize = 200;

fn svg_err<E: std::fmt::Debug>(e: E) -> AppError {
    AppError::input(format!("Failed to draw SVG: {e:?}"))
}

/// Parse `#rrggbb`, falling back to black.
pub fn parse_color(hex: &str) -> RGBColor {
    let h = hex.trim().trim_start_matches('#');
    if h.len() == 6 {
        if let Ok(v) = u32::from_str_radix(h, 16) {
            return RGBColor((v >> 16) as u8, ((v >> 8) & 0xff) as u8, (v & 0xff) as u8);
        }
    }
    BLACK
}

fn upper_bound<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let hi = values
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    if hi > 0.0 { hi * 1.1 } else { 1.0 }
}

fn positive_span(t: f64) -> f64 {
    if t.is_finite() && t > 0.0 { t } else { 1.0 }
}

/// Data points and fitted curve of one strain.
pub fn write_fit_svg(path: &Path, curve: &GrowthCurve, fit: &FitResult, color: &str) -> Result<(), AppError> {
    let t_max = positive_span(curve.max_time().unwrap_or(fit.t_max));
    let fitted: Vec<(f64, f64)> = linspace(0.0, t_max, CURVE_POINTS)
        .into_iter()
        .map(|t| (t, predict(fit.model, t, &fit.params)))
        .collect();
    let y_max = upper_bound(curve.value.iter().chain(fitted.iter().map(|(_, y)| y)));
    let color = parse_color(color);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(svg_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(MARGIN)
        .build_cartesian_2d(0.0..t_max, 0.0..y_max)
        .map_err(svg_err)?;
    chart
        .plotting_area()
        .draw(&Rectangle::new([(0.0, 0.0), (t_max, y_max)], BLACK.stroke_width(1)))
        .map_err(svg_err)?;

    // Whiskers first so the markers sit on top.
    chart
        .draw_series(curve.time.iter().zip(&curve.value).zip(&curve.std).filter_map(|((&t, &y), s)| {
            s.map(|s| PathElement::new(vec![(t, y - s), (t, y + s)], color.mix(0.5).stroke_width(1)))
        }))
        .map_err(svg_err)?;
    chart
        .draw_series(
            curve
                .time
                .iter()
                .zip(&curve.value)
                .map(|(&t, &y)| Circle::new((t, y), 3, color.filled())),
        )
        .map_err(svg_err)?;
    chart
        .draw_series(LineSeries::new(fitted, BLACK.stroke_width(2)))
        .map_err(svg_err)?;

    root.present().map_err(svg_err)
}

/// Mean curves of several strains, each in its own color.
pub fn write_strains_svg(path: &Path, strains: &[(GrowthCurve, String)]) -> Result<(), AppError> {
    let t_max = positive_span(
        strains
            .iter()
            .filter_map(|(c, _)| c.max_time())
            .fold(0.0, f64::max),
    );
    let y_max = upper_bound(strains.iter().flat_map(|(c, _)| c.value.iter()));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(svg_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(MARGIN)
        .build_cartesian_2d(0.0..t_max, 0.0..y_max)
        .map_err(svg_err)?;
    chart
        .plotting_area()
        .draw(&Rectangle::new([(0.0, 0.0), (t_max, y_max)], BLACK.stroke_width(1)))
        .map_err(svg_err)?;

    for (curve, color) in strains {
        let color = parse_color(color);
        let points: Vec<(f64, f64)> = curve.time.iter().copied().zip(curve.value.iter().copied()).collect();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(svg_err)?;
        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 2, color.filled())))
            .map_err(svg_err)?;
    }

    root.present().map_err(svg_err)
}

/// Densities of both strains of a competition.
pub fn write_competition_svg(path: &Path, comp: &Competition, colors: [&str; 2]) -> Result<(), AppError> {
    let t_max = positive_span(comp.time.last().copied().unwrap_or(0.0));
    let y_max = upper_bound(comp.y.iter().flat_map(|y| y.iter()));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(svg_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(MARGIN)
        .build_cartesian_2d(0.0..t_max, 0.0..y_max)
        .map_err(svg_err)?;
    chart
        .plotting_area()
        .draw(&Rectangle::new([(0.0, 0.0), (t_max, y_max)], BLACK.stroke_width(1)))
        .map_err(svg_err)?;

    for (i, color) in colors.iter().enumerate() {
        let series = comp.time.iter().zip(&comp.y).map(move |(&t, y)| (t, y[i]));
        chart
            .draw_series(LineSeries::new(series, parse_color(color).stroke_width(2)))
            .map_err(svg_err)?;
    }

    root.present().map_err(svg_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GrowthParams, ModelKind};
    use crate::fit::fit_quality;

    fn fit() -> FitResult {
        let params = GrowthParams {
            y0: 0.05,
            r: 1.0,
            k: 0.8,
            nu: 1.0,
            q0: None,
            v: None,
        };
        FitResult {
            model: ModelKind::Logistic,
            params,
            init: params,
            errors: Vec::new(),
            quality: fit_quality(20, 3, 0.01),
            lag: 0.0,
            converged: true,
            iterations: 3,
            t_max: 10.0,
        }
    }

    #[test]
    fn colors_parse_from_hex() {
        let c = parse_color("#e41a1c");
        assert_eq!((c.0, c.1, c.2), (0xe4, 0x1a, 0x1c));
        let fallback = parse_color("nonsense");
        assert_eq!((fallback.0, fallback.1, fallback.2), (0, 0, 0));
    }

    #[test]
    fn writes_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let curve = GrowthCurve::from_pairs((0..20).flat_map(|i| {
            let t = i as f64 * 0.5;
            let y = crate::models::logistic(t, 0.05, 1.0, 0.8);
            [(t, y * 0.98), (t, y * 1.02)]
        }));

        let fit_path = dir.path().join("run_strain_1.svg");
        write_fit_svg(&fit_path, &curve, &fit(), "#377eb8").unwrap();
        let text = std::fs::read_to_string(&fit_path).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("circle"));

        let strains_path = dir.path().join("run_strains.svg");
        write_strains_svg(&strains_path, &[(curve.clone(), "#e41a1c".to_string())]).unwrap();
        assert!(strains_path.exists());

        let comp = crate::competition::compete(&fit(), &fit(), 10.0, 20).unwrap();
        let comp_path = dir.path().join("run_2_vs_1.svg");
        write_competition_svg(&comp_path, &comp, ["#e41a1c", "#377eb8"]).unwrap();
        assert!(std::fs::read_to_string(&comp_path).unwrap().contains("polyline"));
    }
}
