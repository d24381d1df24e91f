//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - derive initial guesses and a multi-start grid from the data
//! - fit each model by bounded Levenberg–Marquardt (starts in parallel)
//! - rank models by BIC and test nested hypotheses (lag, curvature)
//! - derive lag duration and growth rates from a fit

pub mod analysis;
pub mod fitter;
pub mod guess;
pub mod lrtest;
pub mod selection;

pub use analysis::*;
pub use fitter::*;
pub use guess::*;
pub use lrtest::*;
pub use selection::*;
