//! Instrument band metadata: central wavelengths and display colors.
//!
//! Every measurement carries a composite `telescope_band` key (the same
//! nominal band observed by different instruments has different effective
//! wavelengths). Two lookup tables, keyed by `telescope_band`, drive the
//! pipeline:
//!
//! - `filter_wavelengths.json`: central wavelength in Å (required for fitting)
//! - `filter_colors.json`: display color (plotting only)
//!
//! A bundled table covering the common ZTF / P200 / Swift-UVOT bands is
//! compiled into the binary; `--instrument-dir` points at a directory with
//! replacement tables. Loading is a pure file read into immutable maps; the
//! table is shared read-only by binning, fitting and plotting.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::SedError;

const BUILTIN_WAVELENGTHS: &str = include_str!("data/filter_wavelengths.json");
const BUILTIN_COLORS: &str = include_str!("data/filter_colors.json");

pub const WAVELENGTHS_FILE: &str = "filter_wavelengths.json";
pub const COLORS_FILE: &str = "filter_colors.json";

/// Immutable `telescope_band` lookup tables.
#[derive(Debug, Clone)]
pub struct FilterTable {
    wavelengths: BTreeMap<String, f64>,
    colors: BTreeMap<String, String>,
}

impl FilterTable {
    /// Load the tables from `dir`, or the bundled tables when `dir` is `None`.
    pub fn load(dir: Option<&Path>) -> Result<Self, SedError> {
        match dir {
            Some(dir) => {
                let wavelengths = read_table(&dir.join(WAVELENGTHS_FILE))?;
                let colors = read_table(&dir.join(COLORS_FILE))?;
                Self::new(wavelengths, colors)
            }
            None => {
                let wavelengths = parse_builtin(BUILTIN_WAVELENGTHS, WAVELENGTHS_FILE)?;
                let colors = parse_builtin(BUILTIN_COLORS, COLORS_FILE)?;
                Self::new(wavelengths, colors)
            }
        }
    }

    /// Build a table from explicit wavelength entries (colors empty).
    pub fn from_wavelengths<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            wavelengths: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            colors: BTreeMap::new(),
        }
    }

    fn new(
        wavelengths: BTreeMap<String, f64>,
        colors: BTreeMap<String, String>,
    ) -> Result<Self, SedError> {
        for (band, &wl) in &wavelengths {
            if !(wl.is_finite() && wl > 0.0) {
                return Err(SedError::Configuration(format!(
                    "Invalid wavelength {wl} for band `{band}` (must be finite and > 0 Å)."
                )));
            }
        }
        Ok(Self {
            wavelengths,
            colors,
        })
    }

    /// Central wavelength (Å) of a `telescope_band`.
    pub fn wavelength(&self, band: &str) -> Result<f64, SedError> {
        self.wavelengths.get(band).copied().ok_or_else(|| {
            SedError::UnknownBand(format!("Band `{band}` is not in the wavelength table."))
        })
    }

    /// Display color of a `telescope_band`, if one is configured.
    pub fn color(&self, band: &str) -> Option<&str> {
        self.colors.get(band).map(String::as_str)
    }

    pub fn contains(&self, band: &str) -> bool {
        self.wavelengths.contains_key(band)
    }

    /// All known bands, in stable (sorted) order.
    pub fn known_bands(&self) -> impl Iterator<Item = &str> {
        self.wavelengths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
}

fn read_table<V: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<BTreeMap<String, V>, SedError> {
    let file = File::open(path).map_err(|e| {
        SedError::Io(format!(
            "Failed to open instrument table '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::from_reader(file).map_err(|e| {
        SedError::Io(format!(
            "Invalid instrument table '{}': {e}",
            path.display()
        ))
    })
}

fn parse_builtin<V: serde::de::DeserializeOwned>(
    raw: &str,
    name: &str,
) -> Result<BTreeMap<String, V>, SedError> {
    serde_json::from_str(raw)
        .map_err(|e| SedError::Io(format!("Invalid bundled instrument table `{name}`: {e}")))
}
