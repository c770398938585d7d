//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed SED points: `o`
//! - fitted model curve: `-` line
//!
//! SED plots use log-log axes (a power law renders as a straight line);
//! parameter time series use linear axes.

use crate::domain::ModelKind;
use crate::fit::SedPoint;
use crate::models::evaluate;

/// Render one bin's observed SED with its fitted model curve.
pub fn render_sed_plot(
    points: &[SedPoint],
    model: ModelKind,
    params: &[f64; 2],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(20);
    let height = height.max(5);

    let usable: Vec<&SedPoint> = points
        .iter()
        .filter(|p| p.wavelength > 0.0 && p.flux > 0.0)
        .collect();
    if usable.is_empty() {
        return "(no plottable SED points)\n".to_string();
    }

    let lx_min = usable
        .iter()
        .map(|p| p.wavelength.log10())
        .fold(f64::INFINITY, f64::min);
    let lx_max = usable
        .iter()
        .map(|p| p.wavelength.log10())
        .fold(f64::NEG_INFINITY, f64::max);
    let (lx_min, lx_max) = pad_range(lx_min, lx_max, 0.05);

    // Sample the model across the wavelength range, one sample per column.
    let curve: Vec<(f64, f64)> = (0..width)
        .filter_map(|col| {
            let u = col as f64 / (width.saturating_sub(1).max(1)) as f64;
            let lx = lx_min + u * (lx_max - lx_min);
            let flux = evaluate(model, 10f64.powf(lx), params);
            (flux.is_finite() && flux > 0.0).then(|| (lx, flux.log10()))
        })
        .collect();

    let ly_min = usable
        .iter()
        .map(|p| p.flux.log10())
        .chain(curve.iter().map(|&(_, ly)| ly))
        .fold(f64::INFINITY, f64::min);
    let ly_max = usable
        .iter()
        .map(|p| p.flux.log10())
        .chain(curve.iter().map(|&(_, ly)| ly))
        .fold(f64::NEG_INFINITY, f64::max);
    let (ly_min, ly_max) = pad_range(ly_min, ly_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    for &(lx, ly) in &curve {
        mark(&mut grid, lx, ly, lx_min, lx_max, ly_min, ly_max, '-');
    }
    for p in &usable {
        mark(
            &mut grid,
            p.wavelength.log10(),
            p.flux.log10(),
            lx_min,
            lx_max,
            ly_min,
            ly_max,
            'o',
        );
    }

    frame(
        &grid,
        &format!("log10 flux [{ly_min:.2}, {ly_max:.2}]"),
        &format!(
            "log10 rest wavelength/AA [{lx_min:.2}, {lx_max:.2}]  (o = observed, - = {})",
            model.display_name()
        ),
    )
}

/// Render a fitted-parameter time series (value vs. epoch MJD).
pub fn render_series_plot(
    label: &str,
    series: &[(f64, f64)],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(20);
    let height = height.max(5);

    let usable: Vec<(f64, f64)> = series
        .iter()
        .copied()
        .filter(|&(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if usable.is_empty() {
        return "(no plottable series points)\n".to_string();
    }

    let x_min = usable.iter().map(|&(x, _)| x).fold(f64::INFINITY, f64::min);
    let x_max = usable
        .iter()
        .map(|&(x, _)| x)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_min = usable.iter().map(|&(_, y)| y).fold(f64::INFINITY, f64::min);
    let y_max = usable
        .iter()
        .map(|&(_, y)| y)
        .fold(f64::NEG_INFINITY, f64::max);
    let (x_min, x_max) = pad_range(x_min, x_max, 0.05);
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    for &(x, y) in &usable {
        mark(&mut grid, x, y, x_min, x_max, y_min, y_max, 'o');
    }

    frame(
        &grid,
        &format!("{label} [{y_min:.4}, {y_max:.4}]"),
        &format!("MJD [{x_min:.1}, {x_max:.1}]"),
    )
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    if !(min.is_finite() && max.is_finite()) {
        return (0.0, 1.0);
    }
    let span = (max - min).abs();
    if span < 1e-12 {
        return (min - 0.5, max + 0.5);
    }
    (min - span * frac, max + span * frac)
}

#[allow(clippy::too_many_arguments)]
fn mark(
    grid: &mut [Vec<char>],
    x: f64,
    y: f64,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    glyph: char,
) {
    let height = grid.len();
    let width = grid[0].len();

    let u = (x - x_min) / (x_max - x_min);
    let v = (y - y_min) / (y_max - y_min);
    if !(u.is_finite() && v.is_finite()) {
        return;
    }

    let col = ((u * (width - 1) as f64).round() as isize).clamp(0, width as isize - 1) as usize;
    // Row 0 is the top of the plot.
    let row = (((1.0 - v) * (height - 1) as f64).round() as isize).clamp(0, height as isize - 1)
        as usize;

    // Observed points overwrite curve samples, never the other way around.
    if glyph == 'o' || grid[row][col] == ' ' {
        grid[row][col] = glyph;
    }
}

fn frame(grid: &[Vec<char>], y_label: &str, x_label: &str) -> String {
    let mut out = String::new();
    out.push_str(y_label);
    out.push('\n');
    for row in grid {
        out.push('|');
        out.extend(row.iter());
        out.push('\n');
    }
    out.push('+');
    out.push_str(&"-".repeat(grid.first().map_or(0, Vec::len)));
    out.push('\n');
    out.push_str(x_label);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<SedPoint> {
        [2100.0f64, 4722.74, 7886.13]
            .iter()
            .map(|&wl| SedPoint {
                telescope_band: "X+b".to_string(),
                wavelength: wl,
                flux: 1.0e-24 * wl.powf(-1.2),
                flux_err: 1.0e-27,
            })
            .collect()
    }

    #[test]
    fn sed_plot_is_deterministic_and_contains_points() {
        let points = sample_points();
        let params = [1.0e-24, 1.2];
        let first = render_sed_plot(&points, ModelKind::Powerlaw, &params, 60, 15);
        let second = render_sed_plot(&points, ModelKind::Powerlaw, &params, 60, 15);
        assert_eq!(first, second);
        assert!(first.contains('o'));
        assert!(first.contains('-'));
    }

    #[test]
    fn series_plot_handles_single_value_ranges() {
        let series = vec![(59200.0, 1.5), (59210.0, 1.5)];
        let plot = render_series_plot("alpha", &series, 40, 8);
        assert!(plot.contains('o'));
        assert!(plot.contains("alpha"));
    }

    #[test]
    fn empty_inputs_do_not_panic() {
        assert!(render_sed_plot(&[], ModelKind::Powerlaw, &[1.0, 1.0], 40, 8)
            .contains("no plottable"));
        assert!(render_series_plot("alpha", &[], 40, 8).contains("no plottable"));
    }
}
