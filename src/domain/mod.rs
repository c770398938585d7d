//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input configuration (`FitConfig`, `ModelKind`, `FitAlgorithm`)
//! - normalized measurements (`Measurement`)
//! - fit outputs (`BinFit`, `GlobalFit`, results file schemas)

pub mod types;

pub use types::*;
