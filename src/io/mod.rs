//! Input/output helpers.
//!
//! - plate-reader file ingest (`ingest`, `tecan`, `tidy`)
//! - results CSV export (`export`)
//! - fit JSON read/write (`curve`)
//! - synthetic growth data (`simulate`)

pub mod curve;
pub mod export;
pub mod ingest;
pub mod simulate;
pub mod tecan;
pub mod tidy;

pub use curve::*;
pub use export::*;
pub use ingest::*;
pub use simulate::*;
pub use tecan::*;
pub use tidy::*;
