//! SED model implementations.
//!
//! Models are implemented as small, pure functions dispatched on `ModelKind`
//! so that fitting code can stay generic.

pub mod model;

pub use model::*;
