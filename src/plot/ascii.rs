//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed (replicate-averaged) points: `o`
//! - fitted curve: `-` line
//! - competitions: assay strain `a`, reference strain `r`

use crate::competition::Competition;
use crate::domain::{FitFile, FitResult, GrowthCurve};
use crate::math::linspace;
use crate::models::predict;

/// Render observed points with the fitted curve.
pub fn render_ascii_plot(curve: &GrowthCurve, fit: &FitResult, width: usize, height: usize) -> String {
    let (t_min, t_max) = time_range(&curve.time).unwrap_or((0.0, fit.t_max.max(1.0)));
    let fitted: Vec<(f64, f64)> = linspace(t_min, t_max, width.max(2))
        .into_iter()
        .map(|t| (t, predict(fit.model, t, &fit.params)))
        .collect();
    let points: Vec<(f64, f64)> = curve.time.iter().copied().zip(curve.value.iter().copied()).collect();
    render_plot(&points, &[(fitted.as_slice(), '-')], t_min, t_max, width, height)
}

/// Render a saved fit file (its data points and precomputed grid).
pub fn render_ascii_plot_from_fit_file(file: &FitFile, width: usize, height: usize) -> String {
    let (t_min, t_max) = time_range(&file.grid.time).unwrap_or((0.0, 1.0));
    let grid: Vec<(f64, f64)> = file.grid.time.iter().copied().zip(file.grid.y.iter().copied()).collect();
    let points: Vec<(f64, f64)> = file.data.time.iter().copied().zip(file.data.y.iter().copied()).collect();
    render_plot(&points, &[(grid.as_slice(), '-')], t_min, t_max, width, height)
}

/// Render both strains of a simulated competition.
pub fn render_competition(comp: &Competition, width: usize, height: usize) -> String {
    let (t_min, t_max) = time_range(&comp.time).unwrap_or((0.0, 1.0));
    let assay: Vec<(f64, f64)> = comp.time.iter().zip(&comp.y).map(|(&t, y)| (t, y[0])).collect();
    let reference: Vec<(f64, f64)> = comp.time.iter().zip(&comp.y).map(|(&t, y)| (t, y[1])).collect();
    render_plot(&[], &[(assay.as_slice(), 'a'), (reference.as_slice(), 'r')], t_min, t_max, width, height)
}

fn render_plot(
    points: &[(f64, f64)],
    lines: &[(&[(f64, f64)], char)],
    t_min: f64,
    t_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    // Determine y-range from observed points and curve points.
    let all = points.iter().chain(lines.iter().flat_map(|(l, _)| l.iter()));
    let (y_min, y_max) = y_range(all).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curves first (so points can overlay).
    for &(line, ch) in lines {
        draw_curve(&mut grid, line, ch, (t_min, t_max), (y_min, y_max));
    }

    for &(t, y) in points {
        if !(t.is_finite() && y.is_finite()) {
            continue;
        }
        let x = map_x(t, t_min, t_max, width);
        let y = map_y(y, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: time=[{t_min:.3}, {t_max:.3}] h | OD=[{y_min:.3}, {y_max:.3}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn time_range(times: &[f64]) -> Option<(f64, f64)> {
    let mut min_t = f64::INFINITY;
    let mut max_t = f64::NEG_INFINITY;
    for &t in times {
        min_t = min_t.min(t);
        max_t = max_t.max(t);
    }
    if min_t.is_finite() && max_t.is_finite() && max_t > min_t {
        Some((min_t, max_t))
    } else {
        None
    }
}

fn y_range<'a>(values: impl Iterator<Item = &'a (f64, f64)>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in values {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top (largest y).
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], ch: char, t: (f64, f64), y: (f64, f64)) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(ti, yi) in curve {
        if !(ti.is_finite() && yi.is_finite()) {
            prev = None;
            continue;
        }
        let x = map_x(ti, t.0, t.1, width);
        let yy = map_y(yi, y.0, y.1, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, ch);
        } else if grid[yy][x] == ' ' {
            grid[yy][x] = ch;
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
