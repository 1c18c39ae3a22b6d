//! Pipeline module - label file in, per-item labels out.

mod emit;
mod input;
mod run;

pub use emit::*;
pub use input::*;
pub use run::*;
