//! Read/write fit results JSON files.
//!
//! Results JSON is the portable representation of a fit run:
//! - `<model>.json`: per-bin parameter estimates keyed by bin index
//! - `<model>_global.json`: shared parameters under the `"global"` key
//!
//! The schemas are defined by `domain::ResultsFile` / `domain::GlobalResultsFile`.
//! Files are written once per run, after all bins have been processed, via a
//! temp-file-then-rename so readers never observe a partial document.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::domain::{GlobalResultsFile, ModelKind, ResultsFile};
use crate::error::SedError;

/// Path of the per-bin results file for `model` under `fit_dir`.
pub fn results_path(fit_dir: &Path, model: ModelKind) -> PathBuf {
    fit_dir.join(format!("{}.json", model.file_stem()))
}

/// Path of the global results file for `model` under `fit_dir`.
pub fn global_results_path(fit_dir: &Path, model: ModelKind) -> PathBuf {
    fit_dir.join(format!("{}_global.json", model.file_stem()))
}

/// Write the per-bin results file. Returns the path written.
pub fn write_results(fit_dir: &Path, results: &ResultsFile) -> Result<PathBuf, SedError> {
    let path = results_path(fit_dir, results.model);
    write_json(fit_dir, &path, results)?;
    Ok(path)
}

/// Read a per-bin results file back.
pub fn read_results(fit_dir: &Path, model: ModelKind) -> Result<ResultsFile, SedError> {
    read_json(&results_path(fit_dir, model))
}

/// Write the global results file. Returns the path written.
pub fn write_global_results(
    fit_dir: &Path,
    results: &GlobalResultsFile,
) -> Result<PathBuf, SedError> {
    let path = global_results_path(fit_dir, results.model);
    write_json(fit_dir, &path, results)?;
    Ok(path)
}

/// Read a global results file back.
pub fn read_global_results(fit_dir: &Path, model: ModelKind) -> Result<GlobalResultsFile, SedError> {
    read_json(&global_results_path(fit_dir, model))
}

fn write_json<T: serde::Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), SedError> {
    fs::create_dir_all(dir).map_err(|e| {
        SedError::Io(format!(
            "Failed to create results directory '{}': {e}",
            dir.display()
        ))
    })?;

    // Serialize fully, then write to a sibling temp file and rename, so the
    // final path only ever holds a complete document.
    let tmp_path = path.with_extension("json.tmp");
    let tmp = File::create(&tmp_path).map_err(|e| {
        SedError::Io(format!(
            "Failed to create results file '{}': {e}",
            tmp_path.display()
        ))
    })?;
    serde_json::to_writer_pretty(tmp, value)
        .map_err(|e| SedError::Io(format!("Failed to write results JSON: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        SedError::Io(format!(
            "Failed to finalize results file '{}': {e}",
            path.display()
        ))
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SedError> {
    let file = File::open(path).map_err(|e| {
        SedError::Io(format!(
            "Failed to open results file '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| SedError::Io(format!("Invalid results JSON '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BinFit, FitAlgorithm, FitQuality, GlobalBinFit, GlobalFit, ParamEstimate, SedParams,
    };
    use std::collections::BTreeMap;

    fn temp_fit_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("sedfit-results-test-{}-{tag}", std::process::id()));
        dir
    }

    fn sample_results() -> ResultsFile {
        let mut bins = BTreeMap::new();
        bins.insert(
            0,
            BinFit {
                epoch_mjd: 59201.5,
                n_bands: 3,
                n_measurements: 7,
                params: SedParams::Powerlaw {
                    scale: ParamEstimate {
                        value: 4.2e-24,
                        stderr: 1.1e-25,
                    },
                    alpha: ParamEstimate {
                        value: 1.37,
                        stderr: 0.02,
                    },
                },
                quality: FitQuality {
                    chisq: 1.9,
                    red_chisq: 1.9,
                    ndof: 1,
                    n_points: 3,
                },
            },
        );
        ResultsFile {
            tool: "sedfit".to_string(),
            model: ModelKind::Powerlaw,
            redshift: 0.2666,
            algorithm: FitAlgorithm::Leastsq,
            bins,
        }
    }

    #[test]
    fn results_round_trip_preserves_parameters() {
        let dir = temp_fit_dir("roundtrip");
        let results = sample_results();

        let path = write_results(&dir, &results).unwrap();
        assert!(path.ends_with("powerlaw.json"));

        let loaded = read_results(&dir, ModelKind::Powerlaw).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(loaded.bins.len(), 1);
        let (orig, back) = (&results.bins[&0], &loaded.bins[&0]);
        assert!((orig.params.shape().value - back.params.shape().value).abs() < 1e-12);
        assert!((orig.params.scale().value - back.params.scale().value).abs() < 1e-36);
        assert!((orig.epoch_mjd - back.epoch_mjd).abs() < 1e-9);
        assert_eq!(back.quality.ndof, 1);
    }

    #[test]
    fn global_results_round_trip() {
        let dir = temp_fit_dir("global");
        let mut bins = BTreeMap::new();
        for (idx, mjd) in [(0usize, 59201.5), (1, 59230.0)] {
            bins.insert(
                idx,
                GlobalBinFit {
                    epoch_mjd: mjd,
                    scale: ParamEstimate {
                        value: 1.0e-23 * (idx as f64 + 1.0),
                        stderr: 2.0e-25,
                    },
                },
            );
        }
        let results = GlobalResultsFile {
            tool: "sedfit".to_string(),
            model: ModelKind::Powerlaw,
            redshift: 0.2666,
            algorithm: FitAlgorithm::Basinhopping,
            global: GlobalFit {
                shared_name: "alpha".to_string(),
                shared: ParamEstimate {
                    value: 1.2,
                    stderr: 0.05,
                },
                bins,
                quality: FitQuality {
                    chisq: 4.0,
                    red_chisq: 1.33,
                    ndof: 3,
                    n_points: 6,
                },
            },
        };

        let path = write_global_results(&dir, &results).unwrap();
        assert!(path.ends_with("powerlaw_global.json"));

        let loaded = read_global_results(&dir, ModelKind::Powerlaw).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert!((loaded.global.shared.value - 1.2).abs() < 1e-12);
        assert_eq!(loaded.global.bins.len(), 2);
        assert!(loaded.global.bins[&1].scale.value > loaded.global.bins[&0].scale.value);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = temp_fit_dir("tmpfile");
        write_results(&dir, &sample_results()).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        std::fs::remove_dir_all(&dir).ok();
        assert!(leftovers.is_empty());
    }
}
