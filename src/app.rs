//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the binning + fitting pipeline
//! - persists results (one atomic write after the whole run)
//! - prints reports/plots

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, PlotArgs};
use crate::domain::{FitAlgorithm, FitConfig};
use crate::error::SedError;

pub mod pipeline;

/// Entry point for the `sedfit` binary.
pub fn run() -> Result<(), SedError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Global(args) => handle_global(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), SedError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    let path = crate::io::results::write_results(&config.fit_dir, &run.results)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &run.bins, &config)
    );
    println!(
        "{}",
        crate::report::format_fit_summary(&run.results, &run.skipped)
    );
    println!("Results written to {}.", path.display());

    if config.plot {
        for bin in &run.bins {
            let Some(fit) = run.results.bins.get(&bin.index) else {
                continue;
            };
            let points = crate::fit::sed_points(bin, config.redshift);
            println!(
                "{}",
                crate::plot::render_sed_plot(
                    &points,
                    config.model,
                    &fit.params.values(),
                    config.plot_width,
                    config.plot_height,
                )
            );
        }
    }

    Ok(())
}

fn handle_global(args: FitArgs) -> Result<(), SedError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_global(&config)?;

    let path = crate::io::results::write_global_results(&config.fit_dir, &run.results)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &run.bins, &config)
    );
    println!("{}", crate::report::format_global_summary(&run.results));
    println!("Results written to {}.", path.display());

    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), SedError> {
    let results = crate::io::results::read_results(&args.fit_dir, args.model)?;
    if results.bins.is_empty() {
        return Err(SedError::InsufficientData(
            "Results file contains no fitted bins to plot.".to_string(),
        ));
    }

    let (label, series) = if args.scale {
        ("scale", crate::report::scale_series(&results))
    } else {
        (
            args.model.shape_param_name(),
            crate::report::shape_series(&results),
        )
    };

    println!(
        "{}",
        crate::plot::render_series_plot(label, &series, args.width, args.height)
    );
    Ok(())
}

/// Build the pipeline configuration from CLI flags.
///
/// Unknown algorithm names fall back to `leastsq`; the raw name is kept so
/// the run summary can surface the substitution.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, SedError> {
    let algorithm =
        FitAlgorithm::resolve(&args.algorithm).unwrap_or(FitAlgorithm::Leastsq);

    let config = FitConfig {
        lightcurve_path: args.lightcurve.clone(),
        instrument_dir: args.instrument_dir.clone(),
        fit_dir: args.fit_dir.clone(),
        redshift: args.redshift,
        nbins: args.nbins,
        model: args.model,
        algorithm,
        algorithm_name: args.algorithm.clone(),
        bands: if args.bands.is_empty() {
            None
        } else {
            Some(args.bands.clone())
        },
        min_bands_per_bin: args.min_bands_per_bin,
        necessary_bands: args.necessary_bands.clone(),
        predefined_bins: args.predefined_bins,
        min_datapoints: args.min_datapoints,
        seed: args.seed,
        restarts: args.restarts,
        plot: args.plot,
        plot_width: args.width,
        plot_height: args.height,
    };

    config.validate()?;
    Ok(config)
}
