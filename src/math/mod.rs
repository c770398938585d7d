//! Mathematical utilities: flux conversion, linear and nonlinear least squares.

pub mod flux;
pub mod leastsq;
pub mod wls;

pub use flux::*;
pub use leastsq::*;
pub use wls::*;
