//! Growth model implementations (logistic, Richards, Baranyi–Roberts).
//!
//! Models are implemented as small, pure functions so that fitting,
//! competition and plotting code can stay generic.

pub mod model;

pub use model::*;
