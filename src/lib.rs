//! dawid-skene - Dawid-Skene EM estimation of true item classes from noisy labels.
//!
//! ## Architecture
//!
//! - **Models**: configuration, observations, estimates and errors
//! - **EM**: count aggregation, initialization, M-step, E-step, log-likelihood, controller
//! - **Pipeline**: label file reader, EM run, label/report writers
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Tensor shapes and normalization invariants
//! - B_i (Beliefs): Fallible input parsing and I/O (Result)
//! - I^R (Resolvable): Tolerance, iteration bound, label types, classes
//! - I^B (Bounded): Degenerate parameters surface as a fatal likelihood error

pub mod em;
pub mod models;
pub mod pipeline;

// Re-exports for convenience
pub use em::{CountTensor, EmController};
pub use models::{Config, EmError, LabelType, NoiseModel, Responses, Result, RunReport};
pub use pipeline::{LabelingPipeline, read_responses};
