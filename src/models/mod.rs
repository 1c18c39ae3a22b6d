//! Core data models for dawid-skene.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters (tolerance, label types)
//! - I^B (Bounded): Error variants for degenerate numerics

mod config;
mod error;
mod estimate;
mod observation;

pub use config::*;
pub use error::*;
pub use estimate::*;
pub use observation::*;
