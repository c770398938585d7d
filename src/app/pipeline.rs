//! Shared "fit pipeline" logic used by the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! instrument tables -> lightcurve ingest -> binning -> per-bin (or global)
//! fits -> results document
//!
//! The CLI layer can then focus on presentation and persistence.

use std::collections::BTreeMap;

use crate::binning::{aggregate, BinningOptions, EpochBin};
use crate::domain::{FitConfig, GlobalResultsFile, ResultsFile};
use crate::error::SedError;
use crate::fit::{fit_bin, fit_global, FitOptions, GlobalFitOptions};
use crate::instruments::FilterTable;
use crate::io::ingest::{load_lightcurve, IngestedData};

/// All computed outputs of a `sedfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub bins: Vec<EpochBin>,
    pub results: ResultsFile,
    /// Bins that were refused or failed to converge, with the reason.
    pub skipped: Vec<(usize, String)>,
}

/// All computed outputs of a `sedfit global` run.
#[derive(Debug, Clone)]
pub struct GlobalRunOutput {
    pub ingest: IngestedData,
    pub bins: Vec<EpochBin>,
    pub results: GlobalResultsFile,
}

/// Load, bin and fit every qualifying bin.
///
/// Per-bin `InsufficientData` / `FitConvergence` conditions are recovered by
/// skipping the bin; any other error aborts the run. Nothing is persisted
/// here; callers write the results document once the whole run is done.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, SedError> {
    config.validate()?;

    let (ingest, bins) = load_and_bin(config)?;

    let total = bins.len();
    let fit_opts = fit_options(config);
    let mut fitted = BTreeMap::new();
    let mut skipped = Vec::new();

    for (done, bin) in bins.iter().enumerate() {
        println!("{}", crate::report::progress_line(done + 1, total, bin));
        match fit_bin(bin, config.model, config.redshift, &fit_opts) {
            Ok(fit) => {
                fitted.insert(bin.index, fit);
            }
            Err(err @ (SedError::InsufficientData(_) | SedError::FitConvergence(_))) => {
                skipped.push((bin.index, err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }

    let results = ResultsFile {
        tool: "sedfit".to_string(),
        model: config.model,
        redshift: config.redshift,
        algorithm: config.algorithm,
        bins: fitted,
    };

    Ok(RunOutput {
        ingest,
        bins,
        results,
        skipped,
    })
}

/// Load, bin and fit shared parameters across all bins jointly.
pub fn run_global(config: &FitConfig) -> Result<GlobalRunOutput, SedError> {
    config.validate()?;

    let (ingest, bins) = load_and_bin(config)?;

    let opts = GlobalFitOptions {
        fit: fit_options(config),
        min_datapoints: resolved_min_datapoints(config, &bins),
    };
    let global = fit_global(&bins, config.model, config.redshift, &opts)?;

    let results = GlobalResultsFile {
        tool: "sedfit".to_string(),
        model: config.model,
        redshift: config.redshift,
        algorithm: config.algorithm,
        global,
    };

    Ok(GlobalRunOutput {
        ingest,
        bins,
        results,
    })
}

fn load_and_bin(config: &FitConfig) -> Result<(IngestedData, Vec<EpochBin>), SedError> {
    let filters = FilterTable::load(config.instrument_dir.as_deref())?;
    let ingest = load_lightcurve(config.lightcurve_path.as_deref())?;

    let opts = BinningOptions {
        nbins: config.nbins,
        bands_to_fit: config.bands.clone(),
        min_bands_per_bin: config.resolved_min_bands(),
        necessary_bands: config.necessary_bands.clone(),
        predefined_bins: config.predefined_bins,
    };
    let bins = aggregate(&ingest.measurements, &filters, &opts)?;

    if bins.is_empty() {
        return Err(SedError::InsufficientData(
            "No bin satisfies the band-sufficiency criteria.".to_string(),
        ));
    }

    Ok((ingest, bins))
}

fn fit_options(config: &FitConfig) -> FitOptions {
    FitOptions {
        algorithm: config.algorithm,
        seed: config.seed,
        restarts: config.restarts,
    }
}

/// Default `min_datapoints` is the number of bands being fit.
fn resolved_min_datapoints(config: &FitConfig, bins: &[EpochBin]) -> usize {
    if let Some(n) = config.min_datapoints {
        return n;
    }
    match &config.bands {
        Some(bands) => bands.len().max(1),
        None => {
            let bands: std::collections::BTreeSet<&str> =
                bins.iter().flat_map(EpochBin::bands).collect();
            bands.len().max(1)
        }
    }
}
