//! Joint fit of one shared shape parameter across all epoch bins.
//!
//! Instead of fitting every epoch independently, a global fit ties the shape
//! parameter (spectral index or temperature) across the whole lightcurve and
//! lets only the per-epoch scale float:
//!
//! ```text
//! params = [shared, scale_0, scale_1, ..., scale_{B-1}]
//! ```
//!
//! A single optimization minimizes the weighted residuals of every bin's SED
//! points at once, so the shared parameter is constrained by all epochs.

use std::collections::BTreeMap;

use nalgebra::DVector;
use rayon::prelude::*;

use crate::binning::EpochBin;
use crate::domain::{
    FitAlgorithm, FitQuality, GlobalBinFit, GlobalFit, ModelKind, ParamEstimate,
};
use crate::error::SedError;
use crate::fit::fitter::{hop_candidates, initial_guess, sed_points, FitOptions, SedPoint};
use crate::math::{levenberg_marquardt, LmOptions, LmOutcome};
use crate::models::{evaluate, param_bounds};

/// Settings for a global fit.
#[derive(Debug, Clone)]
pub struct GlobalFitOptions {
    pub fit: FitOptions,
    /// Minimum total contributing measurements across all bins.
    pub min_datapoints: usize,
}

/// Fit `[shared, scale_b]` jointly over every bin.
///
/// Fails with `InsufficientData` when fewer than `min_datapoints`
/// measurements contribute overall, or when the joint system is
/// underdetermined; with `FitConvergence` when the optimizer fails. Both are
/// fatal here: a global fit has no smaller unit to fall back to.
pub fn fit_global(
    bins: &[EpochBin],
    model: ModelKind,
    redshift: f64,
    opts: &GlobalFitOptions,
) -> Result<GlobalFit, SedError> {
    if bins.is_empty() {
        return Err(SedError::InsufficientData(
            "No qualifying bins for a global fit.".to_string(),
        ));
    }

    let n_measurements: usize = bins.iter().map(EpochBin::n_measurements).sum();
    if n_measurements < opts.min_datapoints {
        return Err(SedError::InsufficientData(format!(
            "Global fit needs at least {} measurements, found {n_measurements}.",
            opts.min_datapoints
        )));
    }

    let per_bin_points: Vec<Vec<SedPoint>> =
        bins.iter().map(|bin| sed_points(bin, redshift)).collect();
    let n_points: usize = per_bin_points.iter().map(Vec::len).sum();
    let n_params = 1 + bins.len();
    if n_points < n_params {
        return Err(SedError::InsufficientData(format!(
            "Global fit is underdetermined: {n_points} SED points for {n_params} free parameters."
        )));
    }

    let guess = global_guess(model, &per_bin_points);
    let bounds = global_bounds(model, bins.len());
    let residuals = |params: &[f64]| global_residuals(model, &per_bin_points, params);
    let lm_opts = LmOptions::default();

    let outcome = match opts.fit.algorithm {
        FitAlgorithm::Leastsq => levenberg_marquardt(&residuals, &guess, &bounds, &lm_opts),
        FitAlgorithm::Basinhopping => {
            let candidates = hop_candidates(&guess, &bounds, opts.fit.seed, opts.fit.restarts);
            candidates
                .par_iter()
                .enumerate()
                .filter_map(|(idx, start)| {
                    levenberg_marquardt(&residuals, start, &bounds, &lm_opts)
                        .map(|outcome| (idx, outcome))
                })
                .min_by(|(ia, a), (ib, b)| {
                    a.chisq
                        .partial_cmp(&b.chisq)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(ia.cmp(ib))
                })
                .map(|(_, outcome)| outcome)
        }
    };

    let outcome = outcome.ok_or_else(|| {
        SedError::FitConvergence(format!(
            "Global {} fit did not converge.",
            model.display_name()
        ))
    })?;

    build_global_fit(bins, model, &outcome, n_points)
}

/// Joint parameter bounds: shape bounds first, then one scale bound per bin.
fn global_bounds(model: ModelKind, n_bins: usize) -> Vec<(f64, f64)> {
    let [scale_bounds, shape_bounds] = param_bounds(model);
    let mut bounds = Vec::with_capacity(1 + n_bins);
    bounds.push(shape_bounds);
    bounds.extend(std::iter::repeat(scale_bounds).take(n_bins));
    bounds
}

/// Initial guess: per-bin guesses from the single-epoch heuristics, with the
/// shared shape set to their mean.
fn global_guess(model: ModelKind, per_bin_points: &[Vec<SedPoint>]) -> Vec<f64> {
    let per_bin: Vec<Vec<f64>> = per_bin_points
        .iter()
        .map(|points| initial_guess(model, points))
        .collect();

    let shared = per_bin.iter().map(|g| g[1]).sum::<f64>() / per_bin.len() as f64;

    let mut guess = Vec::with_capacity(1 + per_bin.len());
    guess.push(shared);
    guess.extend(per_bin.iter().map(|g| g[0]));
    guess
}

/// Concatenated weighted residuals across every bin.
fn global_residuals(
    model: ModelKind,
    per_bin_points: &[Vec<SedPoint>],
    params: &[f64],
) -> Option<DVector<f64>> {
    let shared = params[0];
    let mut r = Vec::with_capacity(per_bin_points.iter().map(Vec::len).sum());
    for (b, points) in per_bin_points.iter().enumerate() {
        let local = [params[1 + b], shared];
        for p in points {
            let m = evaluate(model, p.wavelength, &local);
            if !m.is_finite() {
                return None;
            }
            let sigma = p.flux_err.max(f64::MIN_POSITIVE);
            r.push((p.flux - m) / sigma);
        }
    }
    Some(DVector::from_vec(r))
}

fn build_global_fit(
    bins: &[EpochBin],
    model: ModelKind,
    outcome: &LmOutcome,
    n_points: usize,
) -> Result<GlobalFit, SedError> {
    let n_params = 1 + bins.len();
    let ndof = n_points.saturating_sub(n_params);

    let covariance = outcome.covariance.as_ref().ok_or_else(|| {
        SedError::FitConvergence(
            "Global fit covariance estimate failed (ill-conditioned fit).".to_string(),
        )
    })?;

    let scale_factor = if ndof > 0 {
        (outcome.chisq / ndof as f64).max(0.0)
    } else {
        1.0
    };
    let stderr = |i: usize| (covariance[(i, i)].max(0.0) * scale_factor).sqrt();

    let mut per_bin = BTreeMap::new();
    for (b, bin) in bins.iter().enumerate() {
        per_bin.insert(
            bin.index,
            GlobalBinFit {
                epoch_mjd: bin.epoch_mjd,
                scale: ParamEstimate {
                    value: outcome.params[1 + b],
                    stderr: stderr(1 + b),
                },
            },
        );
    }

    Ok(GlobalFit {
        shared_name: model.shape_param_name().to_string(),
        shared: ParamEstimate {
            value: outcome.params[0],
            stderr: stderr(0),
        },
        bins: per_bin,
        quality: FitQuality {
            chisq: outcome.chisq,
            red_chisq: outcome.chisq / ndof.max(1) as f64,
            ndof,
            n_points,
        },
    })
}
