//! Terminal plotting.
//!
//! The core pipeline never depends on plot output; these renderers only
//! consume binned SEDs and persisted fit results.

pub mod ascii;

pub use ascii::*;
