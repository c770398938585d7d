//! Reporting utilities: run summaries, per-bin progress and epoch formatting.
//!
//! We keep formatting code in one place so:
//! - the binning/fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use chrono::{Duration, NaiveDate};

use crate::binning::EpochBin;
use crate::domain::{FitConfig, GlobalResultsFile, ModelKind, ResultsFile};
use crate::io::ingest::IngestedData;

/// Convert a modified Julian date to a calendar date (UTC).
pub fn mjd_to_date(mjd: f64) -> Option<NaiveDate> {
    if !mjd.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17)?;
    epoch.checked_add_signed(Duration::try_days(mjd.floor() as i64)?)
}

/// Render an epoch as `MJD (date)`, falling back to the bare MJD.
pub fn format_epoch(mjd: f64) -> String {
    match mjd_to_date(mjd) {
        Some(date) => format!("{mjd:.1} ({date})"),
        None => format!("{mjd:.1}"),
    }
}

/// Progress line printed before each bin fit.
pub fn progress_line(done: usize, total: usize, bin: &EpochBin) -> String {
    format!(
        "[{done:>3}/{total}] bin {} @ {} ({} bands, {} measurements)",
        bin.index,
        format_epoch(bin.epoch_mjd),
        bin.samples.len(),
        bin.n_measurements()
    )
}

/// Format the dataset + binning part of the run summary.
pub fn format_run_summary(ingest: &IngestedData, bins: &[EpochBin], config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== sedfit - lightcurve SED fitting ===\n");
    out.push_str(&format!(
        "Model: {} | redshift={} | algorithm={}\n",
        config.model.display_name(),
        config.redshift,
        config.algorithm.display_name()
    ));
    if algorithm_fell_back(config) {
        out.push_str(&format!(
            "(unknown algorithm `{}` requested; using {})\n",
            config.algorithm_name,
            config.algorithm.display_name()
        ));
    }
    out.push_str(&format!(
        "Measurements: n={} ({} bands) | mjd=[{}, {}] | mag=[{:.2}, {:.2}]\n",
        ingest.stats.n_measurements,
        ingest.stats.n_bands,
        format_epoch(ingest.stats.mjd_min),
        format_epoch(ingest.stats.mjd_max),
        ingest.stats.mag_min,
        ingest.stats.mag_max
    ));
    if !ingest.row_errors.is_empty() {
        out.push_str(&format!(
            "Skipped {} malformed rows of {} read.\n",
            ingest.row_errors.len(),
            ingest.rows_read
        ));
    }

    let binning = if config.predefined_bins {
        "predefined labels".to_string()
    } else {
        format!("{} equal-width bins", config.nbins)
    };
    out.push_str(&format!(
        "Binning: {binning} | min bands/bin: {} | necessary: {}\n",
        config.resolved_min_bands(),
        if config.necessary_bands.is_empty() {
            "none".to_string()
        } else {
            config.necessary_bands.join(", ")
        }
    ));
    out.push_str(&format!("Qualifying bins: {}\n", bins.len()));

    out
}

fn algorithm_fell_back(config: &FitConfig) -> bool {
    crate::domain::FitAlgorithm::resolve(&config.algorithm_name).is_none()
}

/// Format per-bin fit results and the skipped-bin diagnostics.
pub fn format_fit_summary(results: &ResultsFile, skipped: &[(usize, String)]) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\nFitted {} of {} bins:\n",
        results.bins.len(),
        results.bins.len() + skipped.len()
    ));

    let shape_label = results.model.shape_param_name();
    for (index, fit) in &results.bins {
        let shape = fit.params.shape();
        let scale = fit.params.scale();
        out.push_str(&format!(
            "  bin {index:>3} @ {}: {shape_label}={} scale={} red_chisq={:.3} (n={})\n",
            format_epoch(fit.epoch_mjd),
            format_value(shape.value, shape.stderr, results.model),
            format_scale(scale.value, scale.stderr),
            fit.quality.red_chisq,
            fit.quality.n_points
        ));
    }
    for (index, reason) in skipped {
        out.push_str(&format!("  (skipped bin {index}) {reason}\n"));
    }

    out
}

/// Format a global fit summary.
pub fn format_global_summary(results: &GlobalResultsFile) -> String {
    let mut out = String::new();
    let global = &results.global;

    out.push_str(&format!(
        "\nGlobal {} fit over {} bins:\n",
        results.model.display_name(),
        global.bins.len()
    ));
    out.push_str(&format!(
        "  shared {} = {}\n",
        global.shared_name,
        format_value(global.shared.value, global.shared.stderr, results.model)
    ));
    out.push_str(&format!(
        "  chisq={:.4} red_chisq={:.4} ndof={}\n",
        global.quality.chisq, global.quality.red_chisq, global.quality.ndof
    ));
    for (index, bin) in &global.bins {
        out.push_str(&format!(
            "  bin {index:>3} @ {}: scale={}\n",
            format_epoch(bin.epoch_mjd),
            format_scale(bin.scale.value, bin.scale.stderr)
        ));
    }

    out
}

fn format_value(value: f64, stderr: f64, model: ModelKind) -> String {
    match model {
        // Spectral indices are O(1); temperatures are O(10^4) K.
        ModelKind::Powerlaw => format!("{value:.4} ± {stderr:.4}"),
        ModelKind::Blackbody => format!("{value:.0} ± {stderr:.0} K"),
    }
}

fn format_scale(value: f64, stderr: f64) -> String {
    format!("{value:.4e} ± {stderr:.1e}")
}

/// Extract the shape-parameter time series from persisted results (for the
/// plotting collaborator).
pub fn shape_series(results: &ResultsFile) -> Vec<(f64, f64)> {
    results
        .bins
        .values()
        .map(|fit| (fit.epoch_mjd, fit.params.shape().value))
        .collect()
}

/// Extract the scale time series from persisted results.
pub fn scale_series(results: &ResultsFile) -> Vec<(f64, f64)> {
    results
        .bins
        .values()
        .map(|fit| (fit.epoch_mjd, fit.params.scale().value))
        .collect()
}
