//! Input/output helpers.
//!
//! - lightcurve CSV ingest + validation (`ingest`)
//! - fit results JSON read/write (`results`)

pub mod ingest;
pub mod results;

pub use ingest::*;
pub use results::*;
