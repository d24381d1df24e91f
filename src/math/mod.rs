//! Mathematical utilities: least squares, numerical calculus, and the
//! chi-square distribution.

pub mod calculus;
pub mod chi2;
pub mod ols;

pub use calculus::*;
pub use chi2::*;
pub use ols::*;
