//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - plate-reader observations (`Well`, `Measurement`, `GrowthCurve`)
//! - the growth model family (`ModelKind`, `ModelSpec`, `GrowthParams`)
//! - fit outputs (`FitResult`, `FitQuality`, `StrainResult`, `FitFile`)

pub mod types;

pub use types::*;
