//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during binning and fitting
//! - exported to JSON results files
//! - reloaded later for plotting or comparisons

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SedError;

/// Which parametric SED model to fit per epoch.
///
/// Both models have two free parameters: an overall scale and one shape
/// parameter (spectral index or temperature). The shape parameter is the one
/// that can be shared across epochs in a global fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Powerlaw,
    Blackbody,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Powerlaw => "power law",
            ModelKind::Blackbody => "blackbody",
        }
    }

    /// File stem used for persisted results (`powerlaw.json`, `blackbody_global.json`).
    pub fn file_stem(self) -> &'static str {
        match self {
            ModelKind::Powerlaw => "powerlaw",
            ModelKind::Blackbody => "blackbody",
        }
    }

    /// Number of free parameters per epoch.
    pub fn param_count(self) -> usize {
        2
    }

    /// Name of the shape parameter (the one shared in global fits).
    pub fn shape_param_name(self) -> &'static str {
        match self {
            ModelKind::Powerlaw => "alpha",
            ModelKind::Blackbody => "temperature",
        }
    }
}

/// Optimizer used for each SED fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitAlgorithm {
    /// Damped least squares (Levenberg–Marquardt) from a deterministic
    /// initial guess.
    Leastsq,
    /// Seeded multi-start least squares: perturbed restarts evaluated
    /// independently, lowest chi-square wins.
    Basinhopping,
}

impl FitAlgorithm {
    /// Resolve an algorithm name. Returns `None` for unrecognized names so
    /// the caller can fall back to the default and report the substitution.
    pub fn resolve(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "leastsq" => Some(FitAlgorithm::Leastsq),
            "basinhopping" => Some(FitAlgorithm::Basinhopping),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FitAlgorithm::Leastsq => "leastsq",
            FitAlgorithm::Basinhopping => "basinhopping",
        }
    }
}

/// One photometric measurement, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Observation time (modified Julian date).
    pub obsmjd: f64,
    /// AB magnitude.
    pub mag: f64,
    /// Magnitude uncertainty.
    pub mag_err: f64,
    pub telescope: String,
    pub band: String,
    /// Composite `telescope+band` key into the instrument tables.
    pub telescope_band: String,
    /// Optional externally assigned bin label.
    pub bin_label: Option<i64>,
}

/// A fitted parameter value with its standard error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub value: f64,
    pub stderr: f64,
}

/// Fit quality diagnostics for a weighted least-squares fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub chisq: f64,
    pub red_chisq: f64,
    pub ndof: usize,
    pub n_points: usize,
}

/// Best-fit parameters for one epoch SED.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum SedParams {
    Powerlaw {
        scale: ParamEstimate,
        alpha: ParamEstimate,
    },
    Blackbody {
        scale: ParamEstimate,
        temperature: ParamEstimate,
    },
}

impl SedParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            SedParams::Powerlaw { .. } => ModelKind::Powerlaw,
            SedParams::Blackbody { .. } => ModelKind::Blackbody,
        }
    }

    pub fn scale(&self) -> ParamEstimate {
        match self {
            SedParams::Powerlaw { scale, .. } | SedParams::Blackbody { scale, .. } => *scale,
        }
    }

    /// The shape parameter (spectral index or temperature).
    pub fn shape(&self) -> ParamEstimate {
        match self {
            SedParams::Powerlaw { alpha, .. } => *alpha,
            SedParams::Blackbody { temperature, .. } => *temperature,
        }
    }

    /// Parameter values in `[scale, shape]` order, for model evaluation.
    pub fn values(&self) -> [f64; 2] {
        [self.scale().value, self.shape().value]
    }
}

/// Fit output for a single time bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinFit {
    /// Representative epoch of the bin (MJD).
    pub epoch_mjd: f64,
    /// Number of distinct bands contributing to the SED.
    pub n_bands: usize,
    /// Number of raw measurements aggregated into the SED.
    pub n_measurements: usize,
    pub params: SedParams,
    pub quality: FitQuality,
}

/// Per-bin local parameters of a global fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalBinFit {
    pub epoch_mjd: f64,
    pub scale: ParamEstimate,
}

/// Output of a global (shared-parameter) fit.
///
/// The shared shape parameter appears once; per-bin scales are keyed by the
/// same bin indices as per-bin fit results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalFit {
    pub shared_name: String,
    pub shared: ParamEstimate,
    pub bins: BTreeMap<usize, GlobalBinFit>,
    pub quality: FitQuality,
}

/// A saved per-bin results file (JSON). Schema of `<model>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub model: ModelKind,
    pub redshift: f64,
    pub algorithm: FitAlgorithm,
    /// Fit results keyed by bin index. Bins that were disqualified, refused
    /// or failed to converge are simply absent.
    pub bins: BTreeMap<usize, BinFit>,
}

/// A saved global results file (JSON). Schema of `<model>_global.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalResultsFile {
    pub tool: String,
    pub model: ModelKind,
    pub redshift: f64,
    pub algorithm: FitAlgorithm,
    #[serde(rename = "global")]
    pub global: GlobalFit,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Lightcurve CSV path; `None` uses the conventional default location.
    pub lightcurve_path: Option<PathBuf>,
    /// Directory holding the instrument lookup tables; `None` uses the
    /// bundled tables.
    pub instrument_dir: Option<PathBuf>,
    /// Directory where results files are written.
    pub fit_dir: PathBuf,

    /// Source redshift (dimensionless).
    pub redshift: f64,
    /// Number of equal-width time bins.
    pub nbins: usize,
    pub model: ModelKind,
    pub algorithm: FitAlgorithm,
    /// Raw algorithm name as supplied, kept for reporting fallbacks.
    pub algorithm_name: String,

    /// Restrict fitting to these `telescope_band`s (`None` = all known).
    pub bands: Option<Vec<String>>,
    /// Minimum distinct bands per bin; `None` resolves to the number of
    /// requested bands, or 2 when fitting all bands.
    pub min_bands_per_bin: Option<usize>,
    /// Bands that must all be present for a bin to qualify.
    pub necessary_bands: Vec<String>,
    /// Group by the `bin` label column instead of equal-width intervals.
    pub predefined_bins: bool,
    /// Minimum total measurements required for a global fit; `None` resolves
    /// to the number of bands being fit.
    pub min_datapoints: Option<usize>,

    /// Seed for the multi-start algorithm.
    pub seed: u64,
    /// Number of multi-start candidates (including the unperturbed guess).
    pub restarts: usize,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl FitConfig {
    /// Validate settings that must hold before any data is touched.
    pub fn validate(&self) -> Result<(), SedError> {
        if !self.redshift.is_finite() || self.redshift <= -1.0 {
            return Err(SedError::Configuration(format!(
                "Invalid redshift {} (must be finite and > -1).",
                self.redshift
            )));
        }
        if self.nbins == 0 {
            return Err(SedError::Configuration(
                "Number of bins must be >= 1.".to_string(),
            ));
        }
        if self.restarts == 0 {
            return Err(SedError::Configuration(
                "Number of restarts must be >= 1.".to_string(),
            ));
        }
        if let Some(min_bands) = self.min_bands_per_bin {
            if min_bands == 0 {
                return Err(SedError::Configuration(
                    "min-bands-per-bin must be >= 1.".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolved minimum distinct bands per bin.
    pub fn resolved_min_bands(&self) -> usize {
        match self.min_bands_per_bin {
            Some(n) => n,
            None => match &self.bands {
                Some(bands) => bands.len().max(1),
                None => 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_resolution_is_case_insensitive() {
        assert_eq!(
            FitAlgorithm::resolve("LeastSq"),
            Some(FitAlgorithm::Leastsq)
        );
        assert_eq!(
            FitAlgorithm::resolve(" basinhopping "),
            Some(FitAlgorithm::Basinhopping)
        );
        assert_eq!(FitAlgorithm::resolve("nelder"), None);
    }

    #[test]
    fn min_bands_defaults_follow_band_selection() {
        let mut config = test_config();
        assert_eq!(config.resolved_min_bands(), 2);

        config.bands = Some(vec![
            "P48+ZTF_g".to_string(),
            "P48+ZTF_r".to_string(),
            "P48+ZTF_i".to_string(),
        ]);
        assert_eq!(config.resolved_min_bands(), 3);

        config.min_bands_per_bin = Some(2);
        assert_eq!(config.resolved_min_bands(), 2);
    }

    #[test]
    fn validate_rejects_bad_redshift_and_bins() {
        let mut config = test_config();
        config.redshift = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.nbins = 0;
        assert!(config.validate().is_err());
    }

    fn test_config() -> FitConfig {
        FitConfig {
            lightcurve_path: None,
            instrument_dir: None,
            fit_dir: PathBuf::from("fit"),
            redshift: 0.1,
            nbins: 30,
            model: ModelKind::Powerlaw,
            algorithm: FitAlgorithm::Leastsq,
            algorithm_name: "leastsq".to_string(),
            bands: None,
            min_bands_per_bin: None,
            necessary_bands: Vec::new(),
            predefined_bins: false,
            min_datapoints: None,
            seed: 42,
            restarts: 20,
            plot: false,
            plot_width: 100,
            plot_height: 25,
        }
    }
}
