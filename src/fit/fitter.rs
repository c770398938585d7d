//! Per-bin SED fitting.
//!
//! Given one qualifying time bin (per-band mean magnitudes), we:
//! - convert magnitudes to flux densities with propagated uncertainties
//! - shift band wavelengths to the rest frame
//! - minimize the weighted residuals between observed and model fluxes
//!
//! Two optimizers are available. `leastsq` runs a single damped
//! least-squares minimization from a data-driven initial guess.
//! `basinhopping` evaluates seeded perturbations of that guess independently
//! (parallel) and keeps the lowest chi-square; ties break on candidate index
//! so results are deterministic.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::binning::EpochBin;
use crate::domain::{BinFit, FitAlgorithm, FitQuality, ModelKind, ParamEstimate, SedParams};
use crate::error::SedError;
use crate::math::{
    abmag_err_to_flux_err, abmag_to_flux, levenberg_marquardt, solve_weighted_least_squares,
    LmOptions, LmOutcome,
};
use crate::models::{evaluate, param_bounds, planck_nu};

/// Wien displacement constant for the frequency-form peak (cm K).
const WIEN_NU_CM_K: f64 = 0.50995;

/// Log-scale sigma of multiplicative scale perturbations (decades).
const HOP_SCALE_DECADES: f64 = 0.5;
/// Fractional sigma of shape-parameter perturbations.
const HOP_SHAPE_FRACTION: f64 = 0.3;

/// One SED point in flux space, after magnitude conversion and redshift
/// correction.
#[derive(Debug, Clone)]
pub struct SedPoint {
    pub telescope_band: String,
    /// Rest-frame wavelength (Å).
    pub wavelength: f64,
    /// Flux density (erg s⁻¹ cm⁻² Hz⁻¹).
    pub flux: f64,
    pub flux_err: f64,
}

/// Optimizer settings shared by per-bin and global fits.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub algorithm: FitAlgorithm,
    /// Seed for multi-start candidate generation.
    pub seed: u64,
    /// Number of multi-start candidates (including the unperturbed guess).
    pub restarts: usize,
}

/// Convert a bin's per-band aggregates into rest-frame flux points.
pub fn sed_points(bin: &EpochBin, redshift: f64) -> Vec<SedPoint> {
    bin.samples
        .iter()
        .map(|s| SedPoint {
            telescope_band: s.telescope_band.clone(),
            wavelength: s.wavelength / (1.0 + redshift),
            flux: abmag_to_flux(s.mean_mag),
            flux_err: abmag_err_to_flux_err(s.mean_mag, s.mean_mag_err),
        })
        .collect()
}

/// Fit the chosen model to one bin's SED.
///
/// Refuses underdetermined bins (`InsufficientData`) before touching the
/// optimizer; optimizer failures surface as `FitConvergence`. Both are
/// per-bin conditions that callers recover from by skipping the bin.
pub fn fit_bin(
    bin: &EpochBin,
    model: ModelKind,
    redshift: f64,
    opts: &FitOptions,
) -> Result<BinFit, SedError> {
    let points = sed_points(bin, redshift);
    let outcome = fit_sed(&points, model, opts, bin.index)?;
    let (params, quality) = estimates_from_outcome(&outcome, model, points.len(), bin.index)?;

    Ok(BinFit {
        epoch_mjd: bin.epoch_mjd,
        n_bands: bin.samples.len(),
        n_measurements: bin.n_measurements(),
        params,
        quality,
    })
}

/// Minimize the weighted SED residuals for one set of flux points.
pub(crate) fn fit_sed(
    points: &[SedPoint],
    model: ModelKind,
    opts: &FitOptions,
    bin_index: usize,
) -> Result<LmOutcome, SedError> {
    let k = model.param_count();
    if points.len() < k {
        return Err(SedError::InsufficientData(format!(
            "Bin {bin_index}: {} SED points for {k} free parameters.",
            points.len()
        )));
    }

    let residuals = residual_fn(points, model);
    let bounds = param_bounds(model);
    let guess = initial_guess(model, points);
    let lm_opts = LmOptions::default();

    let outcome = match opts.algorithm {
        FitAlgorithm::Leastsq => levenberg_marquardt(&residuals, &guess, &bounds, &lm_opts),
        FitAlgorithm::Basinhopping => {
            let candidates = hop_candidates(&guess, &bounds, opts.seed, opts.restarts);
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

    outcome.ok_or_else(|| {
        SedError::FitConvergence(format!(
            "Bin {bin_index}: {} fit did not converge.",
            model.display_name()
        ))
    })
}

/// Weighted residual vector `(f_obs - f_model) / σ_f` over the SED points.
fn residual_fn(points: &[SedPoint], model: ModelKind) -> impl Fn(&[f64]) -> Option<DVector<f64>> + Sync + '_ {
    move |params: &[f64]| {
        let mut r = Vec::with_capacity(points.len());
        for p in points {
            let m = evaluate(model, p.wavelength, params);
            if !m.is_finite() {
                return None;
            }
            let sigma = p.flux_err.max(f64::MIN_POSITIVE);
            r.push((p.flux - m) / sigma);
        }
        Some(DVector::from_vec(r))
    }
}

/// Data-driven starting point for the optimizer.
///
/// Power law: weighted regression in log-log space (the model is linear
/// there). Blackbody: Wien-displacement temperature from the brightest
/// point, scale matched at that point.
pub(crate) fn initial_guess(model: ModelKind, points: &[SedPoint]) -> Vec<f64> {
    let bounds = param_bounds(model);
    match model {
        ModelKind::Powerlaw => {
            let usable: Vec<&SedPoint> = points.iter().filter(|p| p.flux > 0.0).collect();
            let guess = loglog_regression(&usable);
            let (scale, alpha) = guess.unwrap_or_else(|| fallback_powerlaw_guess(points));
            vec![
                scale.clamp(bounds[0].0, bounds[0].1),
                alpha.clamp(bounds[1].0, bounds[1].1),
            ]
        }
        ModelKind::Blackbody => {
            let Some(peak) = points.iter().max_by(|a, b| {
                a.flux
                    .partial_cmp(&b.flux)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }) else {
                return vec![bounds[0].0, bounds[1].0];
            };
            let wl_cm = peak.wavelength * 1e-8;
            let temperature = (WIEN_NU_CM_K / wl_cm).clamp(bounds[1].0, bounds[1].1);
            let planck = planck_nu(peak.wavelength, temperature);
            let scale = if planck > 0.0 {
                (peak.flux / planck).clamp(bounds[0].0, bounds[0].1)
            } else {
                bounds[0].0
            };
            vec![scale, temperature]
        }
    }
}

/// Solve `ln f = ln A - α ln λ` with weights from the relative flux errors.
fn loglog_regression(points: &[&SedPoint]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len();
    let mut x = nalgebra::DMatrix::<f64>::zeros(n, 2);
    let mut y = DVector::<f64>::zeros(n);
    let mut w = Vec::with_capacity(n);
    for (i, p) in points.iter().enumerate() {
        x[(i, 0)] = 1.0;
        x[(i, 1)] = -p.wavelength.ln();
        y[i] = p.flux.ln();
        // σ_lnf = σ_f / f
        let rel = p.flux_err / p.flux;
        w.push(if rel.is_finite() && rel > 0.0 {
            1.0 / (rel * rel)
        } else {
            1.0
        });
    }

    let beta = solve_weighted_least_squares(&x, &y, &w)?;
    let scale = beta[0].exp();
    if !scale.is_finite() {
        return None;
    }
    Some((scale, beta[1]))
}

fn fallback_powerlaw_guess(points: &[SedPoint]) -> (f64, f64) {
    let alpha = 1.0;
    let anchor = &points[points.len() / 2];
    (anchor.flux.abs().max(f64::MIN_POSITIVE) * anchor.wavelength.powf(alpha), alpha)
}

/// Deterministic multi-start candidates: the unperturbed guess plus seeded
/// perturbations.
///
/// Positive-constrained parameters (scales, temperatures) span decades, so
/// they hop multiplicatively in log space; signed parameters (spectral
/// indices) are nudged by a fraction of their magnitude.
pub(crate) fn hop_candidates(
    guess: &[f64],
    bounds: &[(f64, f64)],
    seed: u64,
    restarts: usize,
) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut candidates = Vec::with_capacity(restarts);
    candidates.push(guess.to_vec());

    while candidates.len() < restarts {
        let perturbed: Vec<f64> = guess
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let z: f64 = rng.sample(StandardNormal);
                let positive_only = bounds[i].0 > 0.0;
                let moved = if positive_only {
                    v * 10f64.powf(z * HOP_SCALE_DECADES)
                } else {
                    let spread = v.abs().max(1.0) * HOP_SHAPE_FRACTION;
                    v + z * spread
                };
                moved.clamp(bounds[i].0, bounds[i].1)
            })
            .collect();
        candidates.push(perturbed);
    }

    candidates
}

/// Turn a converged optimizer state into parameter estimates and fit quality.
pub(crate) fn estimates_from_outcome(
    outcome: &LmOutcome,
    model: ModelKind,
    n_points: usize,
    bin_index: usize,
) -> Result<(SedParams, FitQuality), SedError> {
    let k = model.param_count();
    let ndof = n_points.saturating_sub(k);

    let covariance = outcome.covariance.as_ref().ok_or_else(|| {
        SedError::FitConvergence(format!(
            "Bin {bin_index}: covariance estimate failed (ill-conditioned fit)."
        ))
    })?;

    // Standard errors from the covariance diagonal, scaled by the reduced
    // chi-square when there are spare degrees of freedom (matching the usual
    // least-squares convention).
    let scale_factor = if ndof > 0 {
        (outcome.chisq / ndof as f64).max(0.0)
    } else {
        1.0
    };
    let stderr = |i: usize| (covariance[(i, i)].max(0.0) * scale_factor).sqrt();

    let scale = ParamEstimate {
        value: outcome.params[0],
        stderr: stderr(0),
    };
    let shape = ParamEstimate {
        value: outcome.params[1],
        stderr: stderr(1),
    };

    let params = match model {
        ModelKind::Powerlaw => SedParams::Powerlaw {
            scale,
            alpha: shape,
        },
        ModelKind::Blackbody => SedParams::Blackbody {
            scale,
            temperature: shape,
        },
    };

    let quality = FitQuality {
        chisq: outcome.chisq,
        red_chisq: outcome.chisq / ndof.max(1) as f64,
        ndof,
        n_points,
    };

    Ok((params, quality))
}
