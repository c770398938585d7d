//! Time binning and per-band aggregation.
//!
//! Turns an irregular multi-band lightcurve into one SED snapshot per time
//! bin:
//!
//! - partition measurements into `nbins` equal-width intervals, or group by a
//!   predefined integer `bin` label
//! - aggregate an arithmetic mean magnitude and mean magnitude uncertainty
//!   per `(bin, telescope_band)`
//! - keep only bins that satisfy the band-sufficiency criteria
//!
//! Mean uncertainties are plain arithmetic means, not inverse-variance means;
//! downstream weighting happens in flux space during the fit.

use std::collections::BTreeMap;

use crate::domain::Measurement;
use crate::error::SedError;
use crate::instruments::FilterTable;

/// Binning and qualification settings for one aggregation pass.
#[derive(Debug, Clone)]
pub struct BinningOptions {
    /// Number of equal-width bins (ignored in predefined mode).
    pub nbins: usize,
    /// Restrict to these `telescope_band`s; `None` fits every known band.
    pub bands_to_fit: Option<Vec<String>>,
    /// Minimum distinct bands a bin must contain to qualify.
    pub min_bands_per_bin: usize,
    /// Bands that must all be present for a bin to qualify.
    pub necessary_bands: Vec<String>,
    /// Group by the measurements' `bin` labels instead of time intervals.
    pub predefined_bins: bool,
}

/// Aggregated photometry of one band within one bin.
#[derive(Debug, Clone)]
pub struct BandSample {
    pub telescope_band: String,
    /// Central wavelength of the band (Å, observer frame).
    pub wavelength: f64,
    pub mean_mag: f64,
    pub mean_mag_err: f64,
    /// Number of measurements contributing to the means.
    pub entries: usize,
}

/// One qualifying time bin: an SED snapshot.
#[derive(Debug, Clone)]
pub struct EpochBin {
    /// Sequential index over qualifying bins, in chronological order. This is
    /// the key under which fit results are persisted.
    pub index: usize,
    /// Representative time: interval midpoint for equal-width bins, mean of
    /// member timestamps for predefined bins.
    pub epoch_mjd: f64,
    /// Per-band aggregates, sorted by `telescope_band`.
    pub samples: Vec<BandSample>,
}

impl EpochBin {
    /// Total number of raw measurements aggregated into this bin.
    pub fn n_measurements(&self) -> usize {
        self.samples.iter().map(|s| s.entries).sum()
    }

    pub fn bands(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.telescope_band.as_str())
    }
}

/// Bin the lightcurve and aggregate per-band magnitudes.
///
/// Measurements in bands absent from the wavelength table are excluded here
/// (they cannot be placed on a wavelength axis); this is a per-row recovery,
/// never an error. Disqualified bins are silently dropped. Output order is
/// deterministic: bins chronological, samples sorted by band.
pub fn aggregate(
    measurements: &[Measurement],
    filters: &FilterTable,
    opts: &BinningOptions,
) -> Result<Vec<EpochBin>, SedError> {
    if !opts.predefined_bins && opts.nbins == 0 {
        return Err(SedError::Configuration(
            "Number of bins must be >= 1.".to_string(),
        ));
    }
    if opts.min_bands_per_bin == 0 {
        return Err(SedError::Configuration(
            "min-bands-per-bin must be >= 1.".to_string(),
        ));
    }

    let selected: Vec<&Measurement> = measurements
        .iter()
        .filter(|m| filters.contains(&m.telescope_band))
        .filter(|m| match &opts.bands_to_fit {
            Some(bands) => bands.iter().any(|b| b == &m.telescope_band),
            None => true,
        })
        .collect();

    if selected.is_empty() {
        return Err(SedError::InsufficientData(
            "No measurements in known bands to bin.".to_string(),
        ));
    }

    let groups = if opts.predefined_bins {
        predefined_groups(&selected)?
    } else {
        equal_width_groups(&selected, opts.nbins)
    };

    let mut bins = Vec::new();
    for (epoch_mjd, members) in groups {
        let samples = aggregate_bands(&members, filters)?;
        if qualifies(&samples, opts) {
            bins.push(EpochBin {
                index: bins.len(),
                epoch_mjd,
                samples,
            });
        }
    }

    Ok(bins)
}

/// Group measurements into `nbins` equal-width intervals.
///
/// Edges are `nbins + 1` linearly spaced values over `[mjd_min, mjd_max]`.
/// Intervals are half-open `[edge[i], edge[i+1])`, except that the final
/// bin's upper edge is inclusive so the latest measurement is never dropped
/// to boundary rounding.
fn equal_width_groups<'a>(
    selected: &[&'a Measurement],
    nbins: usize,
) -> Vec<(f64, Vec<&'a Measurement>)> {
    let mjd_min = selected.iter().map(|m| m.obsmjd).fold(f64::INFINITY, f64::min);
    let mjd_max = selected
        .iter()
        .map(|m| m.obsmjd)
        .fold(f64::NEG_INFINITY, f64::max);

    let span = mjd_max - mjd_min;
    let width = span / nbins as f64;

    let mut groups = Vec::with_capacity(nbins);
    for i in 0..nbins {
        let lower = mjd_min + width * i as f64;
        let upper = if i + 1 == nbins {
            mjd_max
        } else {
            mjd_min + width * (i + 1) as f64
        };
        let last = i + 1 == nbins;

        let members: Vec<&Measurement> = selected
            .iter()
            .copied()
            .filter(|m| m.obsmjd >= lower && (m.obsmjd < upper || (last && m.obsmjd <= upper)))
            .collect();

        if members.is_empty() {
            continue;
        }
        let midpoint = (lower + upper) / 2.0;
        groups.push((midpoint, members));
    }

    groups
}

/// Group measurements by their predefined integer `bin` labels, in ascending
/// label order. The representative time is the mean of member timestamps.
fn predefined_groups<'a>(
    selected: &[&'a Measurement],
) -> Result<Vec<(f64, Vec<&'a Measurement>)>, SedError> {
    let mut by_label: BTreeMap<i64, Vec<&'a Measurement>> = BTreeMap::new();
    for &m in selected {
        if let Some(label) = m.bin_label {
            by_label.entry(label).or_default().push(m);
        }
    }

    if by_label.is_empty() {
        return Err(SedError::MissingColumn(
            "Predefined bins requested, but no measurement carries a `bin` label.".to_string(),
        ));
    }

    Ok(by_label
        .into_values()
        .map(|members| {
            let mean_mjd =
                members.iter().map(|m| m.obsmjd).sum::<f64>() / members.len() as f64;
            (mean_mjd, members)
        })
        .collect())
}

/// Aggregate one bin's measurements into per-band means.
fn aggregate_bands(
    members: &[&Measurement],
    filters: &FilterTable,
) -> Result<Vec<BandSample>, SedError> {
    let mut by_band: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for m in members {
        let entry = by_band.entry(m.telescope_band.as_str()).or_default();
        entry.0 += m.mag;
        entry.1 += m.mag_err;
        entry.2 += 1;
    }

    by_band
        .into_iter()
        .map(|(band, (mag_sum, err_sum, n))| {
            Ok(BandSample {
                telescope_band: band.to_string(),
                wavelength: filters.wavelength(band)?,
                mean_mag: mag_sum / n as f64,
                mean_mag_err: err_sum / n as f64,
                entries: n,
            })
        })
        .collect()
}

fn qualifies(samples: &[BandSample], opts: &BinningOptions) -> bool {
    samples.len() >= opts.min_bands_per_bin
        && opts
            .necessary_bands
            .iter()
            .all(|needed| samples.iter().any(|s| &s.telescope_band == needed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(mjd: f64, mag: f64, mag_err: f64, band: &str) -> Measurement {
        Measurement {
            obsmjd: mjd,
            mag,
            mag_err,
            telescope: "P48".to_string(),
            band: band.to_string(),
            telescope_band: format!("P48+{band}"),
            bin_label: None,
        }
    }

    fn test_filters() -> FilterTable {
        FilterTable::from_wavelengths([
            ("P48+ZTF_g", 4722.74),
            ("P48+ZTF_r", 6339.61),
            ("P48+ZTF_i", 7886.13),
        ])
    }

    fn options(nbins: usize, min_bands: usize) -> BinningOptions {
        BinningOptions {
            nbins,
            bands_to_fit: None,
            min_bands_per_bin: min_bands,
            necessary_bands: Vec::new(),
            predefined_bins: false,
        }
    }

    #[test]
    fn every_measurement_lands_in_exactly_one_bin() {
        let measurements: Vec<Measurement> = (0..50)
            .map(|i| measurement(59200.0 + i as f64 * 0.37, 18.0, 0.05, "ZTF_g"))
            .collect();

        let bins = aggregate(&measurements, &test_filters(), &options(7, 1)).unwrap();
        let total: usize = bins.iter().map(EpochBin::n_measurements).sum();
        assert_eq!(total, measurements.len());
    }

    #[test]
    fn maximum_timestamp_is_not_dropped_at_the_final_edge() {
        // The latest measurement sits exactly on the last edge; a strictly
        // half-open final interval would lose it.
        let measurements = vec![
            measurement(59200.0, 18.0, 0.05, "ZTF_g"),
            measurement(59205.0, 18.1, 0.05, "ZTF_g"),
            measurement(59210.0, 18.2, 0.05, "ZTF_g"),
        ];

        let bins = aggregate(&measurements, &test_filters(), &options(2, 1)).unwrap();
        let total: usize = bins.iter().map(EpochBin::n_measurements).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn qualification_is_monotone_in_min_bands() {
        let mut measurements = Vec::new();
        // Bin 1 region: g only. Bin 2 region: g + r. Bin 3 region: g + r + i.
        measurements.push(measurement(0.0, 18.0, 0.05, "ZTF_g"));
        measurements.push(measurement(10.0, 18.0, 0.05, "ZTF_g"));
        measurements.push(measurement(10.5, 18.5, 0.05, "ZTF_r"));
        measurements.push(measurement(20.0, 18.0, 0.05, "ZTF_g"));
        measurements.push(measurement(20.5, 18.5, 0.05, "ZTF_r"));
        measurements.push(measurement(21.0, 19.0, 0.05, "ZTF_i"));

        let filters = test_filters();
        let mut previous = usize::MAX;
        for min_bands in 1..=4 {
            let bins = aggregate(&measurements, &filters, &options(3, min_bands)).unwrap();
            assert!(
                bins.len() <= previous,
                "min_bands={min_bands} increased qualifying bins"
            );
            previous = bins.len();
        }
    }

    #[test]
    fn single_measurement_mean_is_exact() {
        let measurements = vec![measurement(59200.0, 18.1234, 0.0567, "ZTF_g")];
        let bins = aggregate(&measurements, &test_filters(), &options(1, 1)).unwrap();

        assert_eq!(bins.len(), 1);
        let sample = &bins[0].samples[0];
        assert_eq!(sample.entries, 1);
        assert_eq!(sample.mean_mag, 18.1234);
        assert_eq!(sample.mean_mag_err, 0.0567);
    }

    #[test]
    fn mean_uncertainty_is_arithmetic_not_inverse_variance() {
        let measurements = vec![
            measurement(59200.0, 18.0, 0.02, "ZTF_g"),
            measurement(59200.1, 18.2, 0.08, "ZTF_g"),
        ];
        let bins = aggregate(&measurements, &test_filters(), &options(1, 1)).unwrap();
        let sample = &bins[0].samples[0];
        assert!((sample.mean_mag - 18.1).abs() < 1e-12);
        assert!((sample.mean_mag_err - 0.05).abs() < 1e-12);
    }

    #[test]
    fn unknown_bands_are_excluded_not_fatal() {
        let mut odd = measurement(59200.5, 17.0, 0.03, "ZTF_z");
        odd.telescope_band = "P48+ZTF_z".to_string();
        let measurements = vec![measurement(59200.0, 18.0, 0.05, "ZTF_g"), odd];

        let bins = aggregate(&measurements, &test_filters(), &options(1, 1)).unwrap();
        let total: usize = bins.iter().map(EpochBin::n_measurements).sum();
        assert_eq!(total, 1);
        assert_eq!(bins[0].samples[0].telescope_band, "P48+ZTF_g");
    }

    #[test]
    fn necessary_bands_must_all_be_present() {
        let measurements = vec![
            measurement(59200.0, 18.0, 0.05, "ZTF_g"),
            measurement(59200.5, 18.5, 0.05, "ZTF_r"),
        ];

        let mut opts = options(1, 1);
        opts.necessary_bands = vec!["P48+ZTF_i".to_string()];
        let bins = aggregate(&measurements, &test_filters(), &opts).unwrap();
        assert!(bins.is_empty());

        opts.necessary_bands = vec!["P48+ZTF_g".to_string(), "P48+ZTF_r".to_string()];
        let bins = aggregate(&measurements, &test_filters(), &opts).unwrap();
        assert_eq!(bins.len(), 1);
    }

    #[test]
    fn predefined_bins_use_mean_timestamp() {
        let mut a = measurement(59200.0, 18.0, 0.05, "ZTF_g");
        a.bin_label = Some(3);
        let mut b = measurement(59210.0, 18.5, 0.05, "ZTF_r");
        b.bin_label = Some(3);
        let mut c = measurement(59250.0, 19.0, 0.05, "ZTF_g");
        c.bin_label = Some(7);

        let opts = BinningOptions {
            nbins: 30,
            bands_to_fit: None,
            min_bands_per_bin: 1,
            necessary_bands: Vec::new(),
            predefined_bins: true,
        };
        let bins = aggregate(&[a, b, c], &test_filters(), &opts).unwrap();

        assert_eq!(bins.len(), 2);
        assert!((bins[0].epoch_mjd - 59205.0).abs() < 1e-9);
        assert!((bins[1].epoch_mjd - 59250.0).abs() < 1e-9);
        // Indices are sequential over qualifying bins, not raw labels.
        assert_eq!(bins[0].index, 0);
        assert_eq!(bins[1].index, 1);
    }

    #[test]
    fn predefined_mode_without_labels_is_a_schema_error() {
        let measurements = vec![measurement(59200.0, 18.0, 0.05, "ZTF_g")];
        let opts = BinningOptions {
            predefined_bins: true,
            ..options(1, 1)
        };
        let err = aggregate(&measurements, &test_filters(), &opts).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn band_filter_restricts_fitting_set() {
        let measurements = vec![
            measurement(59200.0, 18.0, 0.05, "ZTF_g"),
            measurement(59200.5, 18.5, 0.05, "ZTF_r"),
        ];
        let mut opts = options(1, 1);
        opts.bands_to_fit = Some(vec!["P48+ZTF_r".to_string()]);

        let bins = aggregate(&measurements, &test_filters(), &opts).unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].samples.len(), 1);
        assert_eq!(bins[0].samples[0].telescope_band, "P48+ZTF_r");
    }
}
