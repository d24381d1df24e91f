//! Plotting: deterministic ASCII plots for the terminal, SVG figures on disk.

pub mod ascii;
pub mod svg;

pub use ascii::*;
pub use svg::*;
