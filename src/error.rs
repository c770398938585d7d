/// Error taxonomy for the SED pipeline.
///
/// Variants group into three fatality classes, reflected in the process exit
/// code when an error reaches `main`:
///
/// - configuration / input problems (`Configuration`, `MissingColumn`, `Io`):
///   fatal, raised before or while loading data (exit code 2)
/// - data sufficiency problems (`UnknownBand`, `InsufficientData`): recovered
///   per-row / per-bin where possible (exit code 3 when surfaced)
/// - numerical problems (`FitConvergence`): recovered per-bin (exit code 4
///   when surfaced)
#[derive(Clone)]
pub enum SedError {
    /// Invalid run configuration (bad model kind, redshift, bin count, ...).
    Configuration(String),
    /// A required column is absent from an input file.
    MissingColumn(String),
    /// Filesystem or serialization failure.
    Io(String),
    /// A `telescope_band` is missing from the wavelength table.
    UnknownBand(String),
    /// Too few measurements/bands to attempt a fit.
    InsufficientData(String),
    /// The optimizer failed to converge or produced no usable covariance.
    FitConvergence(String),
}

impl SedError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SedError::Configuration(_) | SedError::MissingColumn(_) | SedError::Io(_) => 2,
            SedError::UnknownBand(_) | SedError::InsufficientData(_) => 3,
            SedError::FitConvergence(_) => 4,
        }
    }

    fn message(&self) -> &str {
        match self {
            SedError::Configuration(m)
            | SedError::MissingColumn(m)
            | SedError::Io(m)
            | SedError::UnknownBand(m)
            | SedError::InsufficientData(m)
            | SedError::FitConvergence(m) => m,
        }
    }
}

impl std::fmt::Display for SedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::fmt::Debug for SedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SedError::Configuration(_) => "Configuration",
            SedError::MissingColumn(_) => "MissingColumn",
            SedError::Io(_) => "Io",
            SedError::UnknownBand(_) => "UnknownBand",
            SedError::InsufficientData(_) => "InsufficientData",
            SedError::FitConvergence(_) => "FitConvergence",
        };
        f.debug_struct("SedError")
            .field("kind", &name)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message())
            .finish()
    }
}

impl std::error::Error for SedError {}
