//! SED fitting orchestration.
//!
//! Responsibilities:
//!
//! - convert binned magnitudes to rest-frame flux densities
//! - minimize weighted residuals per bin (`fitter`)
//! - jointly fit shared parameters across all bins (`global`)

pub mod fitter;
pub mod global;

pub use fitter::*;
pub use global::*;
