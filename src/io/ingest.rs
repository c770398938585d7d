//! Lightcurve CSV ingest and normalization.
//!
//! This module is responsible for turning a lightcurve CSV into a clean set
//! of `Measurement`s that are safe to bin and fit.
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors, fatal at load)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (no hidden reordering)
//! - **Separation of concerns**: no binning or fitting logic here
//!
//! Columns are addressed by name through a header map, so stray index-column
//! artifacts (an unnamed leading column from dataframe dumps) are ignored
//! without special handling.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Measurement;
use crate::error::SedError;

/// Conventional lightcurve location used when no path is given.
pub const DEFAULT_LIGHTCURVE_PATH: &str = "data/lightcurves/full_lc.csv";

/// Separator between telescope and band in the composite key.
pub const TELESCOPE_BAND_SEPARATOR: char = '+';

/// Summary stats about the measurements actually loaded.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_measurements: usize,
    pub n_bands: usize,
    pub mjd_min: f64,
    pub mjd_max: f64,
    pub mag_min: f64,
    pub mag_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: normalized measurements + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub measurements: Vec<Measurement>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load and normalize a lightcurve CSV to `Measurement`s.
pub fn load_lightcurve(path: Option<&Path>) -> Result<IngestedData, SedError> {
    let path = path.unwrap_or(Path::new(DEFAULT_LIGHTCURVE_PATH));
    let file = File::open(path).map_err(|e| {
        SedError::Io(format!(
            "Failed to open lightcurve '{}': {e}",
            path.display()
        ))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| SedError::Io(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(&header_map)?;

    let mut measurements = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2 because records() starts after the header row and CSV line
        // numbers are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok(m) => measurements.push(m),
            Err(e) => row_errors.push(RowError { line, message: e }),
        }
    }

    let rows_used = measurements.len();
    let stats = compute_stats(&measurements).ok_or_else(|| {
        SedError::InsufficientData("No valid measurements remain after normalization.".to_string())
    })?;

    Ok(IngestedData {
        measurements,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on
    // the first header. If we don't strip it, schema validation will
    // incorrectly report missing columns.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), SedError> {
    for name in ["obsmjd", "mag", "mag_err"] {
        if !header_map.contains_key(name) {
            return Err(SedError::MissingColumn(format!(
                "Missing required column: `{name}`"
            )));
        }
    }

    // `telescope_band` may be precomputed; otherwise both components must
    // exist so it can be derived.
    if !header_map.contains_key("telescope_band")
        && !(header_map.contains_key("telescope") && header_map.contains_key("band"))
    {
        return Err(SedError::MissingColumn(
            "Missing required columns: either `telescope_band` or both `telescope` and `band`"
                .to_string(),
        ));
    }

    Ok(())
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Measurement, String> {
    let obsmjd = parse_f64(get_required(record, header_map, "obsmjd")?, "obsmjd")?;
    let mag = parse_f64(get_required(record, header_map, "mag")?, "mag")?;
    let mag_err = parse_f64(get_required(record, header_map, "mag_err")?, "mag_err")?;

    if mag_err < 0.0 {
        return Err(format!("Negative `mag_err` ({mag_err})."));
    }

    let telescope = get_optional(record, header_map, "telescope")
        .unwrap_or_default()
        .to_string();
    let band = get_optional(record, header_map, "band")
        .unwrap_or_default()
        .to_string();

    let telescope_band = match get_optional(record, header_map, "telescope_band") {
        Some(tb) => tb.to_string(),
        None => {
            if telescope.is_empty() || band.is_empty() {
                return Err("Missing `telescope` or `band` value.".to_string());
            }
            format!("{telescope}{TELESCOPE_BAND_SEPARATOR}{band}")
        }
    };

    let bin_label = match get_optional(record, header_map, "bin") {
        Some(s) => Some(
            s.parse::<i64>()
                .map_err(|_| format!("Invalid `bin` label '{s}'."))?,
        ),
        None => None,
    };

    Ok(Measurement {
        obsmjd,
        mag,
        mag_err,
        telescope,
        band,
        telescope_band,
        bin_label,
    })
}

fn compute_stats(measurements: &[Measurement]) -> Option<DatasetStats> {
    if measurements.is_empty() {
        return None;
    }

    let mut mjd_min = f64::INFINITY;
    let mut mjd_max = f64::NEG_INFINITY;
    let mut mag_min = f64::INFINITY;
    let mut mag_max = f64::NEG_INFINITY;
    let mut bands = BTreeSet::new();

    for m in measurements {
        mjd_min = mjd_min.min(m.obsmjd);
        mjd_max = mjd_max.max(m.obsmjd);
        mag_min = mag_min.min(m.mag);
        mag_max = mag_max.max(m.mag);
        bands.insert(m.telescope_band.as_str());
    }

    if !(mjd_min.is_finite() && mjd_max.is_finite() && mag_min.is_finite() && mag_max.is_finite()) {
        return None;
    }

    Some(DatasetStats {
        n_measurements: measurements.len(),
        n_bands: bands.len(),
        mjd_min,
        mjd_max,
        mag_min,
        mag_max,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{s}'."))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value '{s}'."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(tag: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "sedfit-ingest-test-{}-{tag}.csv",
            std::process::id()
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn derives_telescope_band_when_absent() {
        let path = write_csv(
            "derive",
            "obsmjd,mag,mag_err,telescope,band\n\
             59200.0,18.2,0.05,P48,ZTF_g\n\
             59201.0,18.0,0.04,P48,ZTF_r\n",
        );
        let data = load_lightcurve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.rows_used, 2);
        assert_eq!(data.measurements[0].telescope_band, "P48+ZTF_g");
        assert_eq!(data.measurements[1].telescope_band, "P48+ZTF_r");
    }

    #[test]
    fn precomputed_telescope_band_is_kept_verbatim() {
        let path = write_csv(
            "precomputed",
            "obsmjd,mag,mag_err,telescope_band\n\
             59200.0,18.2,0.05,Swift+UVW1\n",
        );
        let data = load_lightcurve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.measurements[0].telescope_band, "Swift+UVW1");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let path = write_csv(
            "missingcol",
            "obsmjd,mag,telescope,band\n59200.0,18.2,P48,ZTF_g\n");
        let err = load_lightcurve(Some(&path)).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("mag_err"), "{err}");
    }

    #[test]
    fn index_column_artifacts_are_ignored() {
        // Leading unnamed column, as produced by dataframe dumps.
        let path = write_csv(
            "indexcol",
            ",obsmjd,mag,mag_err,telescope,band\n\
             0,59200.0,18.2,0.05,P48,ZTF_g\n\
             1,59201.0,18.0,0.04,P48,ZTF_r\n",
        );
        let data = load_lightcurve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.rows_used, 2);
        assert!((data.measurements[0].obsmjd - 59200.0).abs() < 1e-9);
    }

    #[test]
    fn bad_rows_are_collected_not_fatal() {
        let path = write_csv(
            "badrows",
            "obsmjd,mag,mag_err,telescope,band\n\
             59200.0,18.2,0.05,P48,ZTF_g\n\
             not-a-number,18.0,0.04,P48,ZTF_r\n\
             59202.0,17.9,-0.04,P48,ZTF_i\n",
        );
        let data = load_lightcurve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.rows_read, 3);
        assert_eq!(data.rows_used, 1);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 3);
    }

    #[test]
    fn bin_labels_are_parsed_when_present() {
        let path = write_csv(
            "binlabels",
            "obsmjd,mag,mag_err,telescope,band,bin\n\
             59200.0,18.2,0.05,P48,ZTF_g,0\n\
             59201.0,18.0,0.04,P48,ZTF_r,1\n",
        );
        let data = load_lightcurve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.measurements[0].bin_label, Some(0));
        assert_eq!(data.measurements[1].bin_label, Some(1));
    }
}
