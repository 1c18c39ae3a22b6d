//! Dawid-Skene EM estimation.
//!
//! Flow:
//! Responses → CountTensor → initial posterior → (M-step → E-step → log-likelihood)* → EmOutcome

mod controller;
mod counts;
mod e_step;
mod init;
mod likelihood;
mod m_step;

pub use controller::*;
pub use counts::{CountTensor, POSITIVE_CLASS, check_classes};
pub use e_step::*;
pub use init::*;
pub use likelihood::{log_class_scores, log_likelihood, log_sum_exp};
pub use m_step::*;
