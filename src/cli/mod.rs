//! Command-line parsing for the lightcurve SED fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::ModelKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sedfit", version, about = "Lightcurve SED binning and fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bin the lightcurve and fit the model to each qualifying bin.
    Fit(FitArgs),
    /// Fit one shared shape parameter across all bins jointly.
    Global(FitArgs),
    /// Plot a fitted-parameter time series from previously saved results.
    Plot(PlotArgs),
}

/// Common options for per-bin and global fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Source redshift.
    #[arg(short = 'z', long)]
    pub redshift: f64,

    /// Number of equal-width time bins.
    #[arg(short = 'n', long, default_value_t = 30)]
    pub nbins: usize,

    /// Model fitted to each epoch SED.
    #[arg(long, value_enum, default_value = "powerlaw")]
    pub model: ModelKind,

    /// Fit algorithm (`leastsq` or `basinhopping`); unknown names fall back
    /// to `leastsq`.
    #[arg(long, default_value = "leastsq")]
    pub algorithm: String,

    /// Lightcurve CSV (defaults to `data/lightcurves/full_lc.csv`).
    #[arg(long)]
    pub lightcurve: Option<PathBuf>,

    /// Directory with `filter_wavelengths.json` / `filter_colors.json`
    /// (defaults to the bundled instrument tables).
    #[arg(long)]
    pub instrument_dir: Option<PathBuf>,

    /// Directory where results JSON files are written.
    #[arg(long, default_value = "fit")]
    pub fit_dir: PathBuf,

    /// Fit only these `telescope_band`s (repeatable). Default: all known.
    #[arg(long = "band")]
    pub bands: Vec<String>,

    /// Minimum distinct bands per bin. Default: the number of `--band`
    /// selections, or 2 when fitting all bands.
    #[arg(long)]
    pub min_bands_per_bin: Option<usize>,

    /// Bands that must be present in a bin for it to be fit (repeatable).
    #[arg(long = "necessary-band")]
    pub necessary_bands: Vec<String>,

    /// Group by the `bin` label column instead of equal-width intervals.
    #[arg(long)]
    pub predefined_bins: bool,

    /// Minimum total measurements for a global fit. Default: the number of
    /// bands being fit.
    #[arg(long)]
    pub min_datapoints: Option<usize>,

    /// Random seed for the multi-start algorithm.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Multi-start candidates evaluated by `basinhopping`.
    #[arg(long, default_value_t = 20)]
    pub restarts: usize,

    /// Render an ASCII plot of each fitted SED.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Options for plotting saved results.
#[derive(Debug, Parser, Clone)]
pub struct PlotArgs {
    /// Directory holding the results JSON files.
    #[arg(long, default_value = "fit")]
    pub fit_dir: PathBuf,

    /// Model whose results file is plotted.
    #[arg(long, value_enum, default_value = "powerlaw")]
    pub model: ModelKind,

    /// Plot the scale series instead of the shape parameter.
    #[arg(long)]
    pub scale: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}
