//! `curveball` library crate.
//!
//! Analyzes microbial growth curves with ecological and evolutionary models:
//! plate-reader ingest, nonlinear fitting of the logistic / Richards /
//! Baranyi–Roberts family, model selection, lag and growth-rate estimation,
//! and pairwise competition simulations.
//!
//! The binary (`curveball`) is a thin wrapper around this library so that the
//! modeling code is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod competition;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plate;
pub mod plot;
pub mod report;
