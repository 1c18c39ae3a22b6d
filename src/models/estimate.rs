//! Estimate, label and report types for dawid-skene.
//!
//! K_i: Every array carries a fixed, documented shape:
//! - class marginals `[classes]`
//! - error rates `[observers × classes × classes]`
//! - item class posterior `[items × classes]`

use super::{ItemId, NoiseModel};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model parameters produced by one M-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// P(true class = j), shape `[classes]`
    pub class_marginals: Array1<f64>,

    /// P(observer k emits l | true class j), shape `[observers × classes × classes]`
    pub error_rates: Array3<f64>,
}

impl Parameters {
    /// Summed absolute elementwise differences `(Δ marginals, Δ error rates)`.
    pub fn deltas(&self, previous: &Self) -> (f64, f64) {
        let marginals = (&self.class_marginals - &previous.class_marginals)
            .mapv(f64::abs)
            .sum();
        let error_rates = (&self.error_rates - &previous.error_rates)
            .mapv(f64::abs)
            .sum();
        (marginals, error_rates)
    }

    /// Joint probability of true class j and emitted class l, per observer.
    ///
    /// Shape `[observers × classes × classes]`: `marginals[j] * error_rates[k, j, l]`.
    pub fn incidence_of_error_rates(&self) -> Array3<f64> {
        let mut incidence = self.error_rates.clone();
        for ((_, j, _), value) in incidence.indexed_iter_mut() {
            *value *= self.class_marginals[j];
        }
        incidence
    }
}

/// How the EM loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Both parameter deltas fell below the tolerance
    Converged,
    /// The iteration count exceeded the configured bound
    MaxIterations,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => f.write_str("converged"),
            Self::MaxIterations => f.write_str("max iterations reached"),
        }
    }
}

/// Diagnostics for one EM iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub log_likelihood: f64,

    /// `None` on the first iteration (no previous parameters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_marginals_delta: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rates_delta: Option<f64>,
}

/// Final state of a completed EM run.
#[derive(Debug, Clone)]
pub struct EmOutcome {
    /// Parameters from the last M-step
    pub parameters: Parameters,

    /// Posterior from the last E-step, shape `[items × classes]`
    pub posterior: Array2<f64>,

    pub termination: Termination,

    /// One record per iteration, in order
    pub history: Vec<IterationRecord>,

    /// Item indices forced to class 1 during initialization
    pub reviewed_blind_spots: Vec<usize>,
}

impl EmOutcome {
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    /// Log-likelihood reported by the last iteration.
    pub fn log_likelihood(&self) -> Option<f64> {
        self.history.last().map(|r| r.log_likelihood)
    }
}

/// Hard label for one item, with the posterior mass of that label as weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLabel {
    pub item: ItemId,

    /// Class value (not index) with maximal posterior probability
    pub label: i64,

    /// Posterior probability of `label`
    pub weight: f64,
}

/// Summary of a pipeline run, written as JSON when a report path is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub label_type: String,
    pub am_noise: NoiseModel,
    pub items: usize,
    pub observers: usize,
    pub classes: Vec<i64>,
    pub iterations: usize,
    pub termination: Termination,
    pub log_likelihood: Option<f64>,
    pub class_marginals: Vec<f64>,

    /// `[observer][true class][emitted class]`
    pub error_rates: Vec<Vec<Vec<f64>>>,

    /// `[observer][true class][emitted class]`
    pub incidence_of_error_rates: Vec<Vec<Vec<f64>>>,

    /// Gold observations per class
    pub review_counts: Vec<usize>,

    pub reviewed_blind_spots: usize,
    pub history: Vec<IterationRecord>,
    pub runtime_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Convert a 3D tensor into nested vectors for serialization.
pub fn nested(tensor: &Array3<f64>) -> Vec<Vec<Vec<f64>>> {
    tensor
        .axis_iter(Axis(0))
        .map(|matrix| matrix.rows().into_iter().map(|row| row.to_vec()).collect())
        .collect()
}
