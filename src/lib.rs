//! `sed-fit` library crate.
//!
//! The binary (`sedfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., future service wrappers, notebooks, etc.)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod binning;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod instruments;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
