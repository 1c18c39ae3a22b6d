//! Log-likelihood of the observed counts under the current parameters.
//!
//! K_i: Diagnostic only; never consulted by the convergence test.
//! I^B: A non-finite total is a degenerate parameter state and aborts the run.
//!
//! Per-class scores are kept in log space:
//! `log p_j + Σ_{k,l} count[k, l] · log π[k, j, l]`.
//! Terms with a zero count are skipped, so a zero rate raised to a zero count
//! contributes a factor of 1 (the empty-product convention) instead of NaN.

use super::counts::CountTensor;
use crate::models::{EmError, Parameters, Result};
use ndarray::{Array1, ArrayView2};
use tracing::error;

/// Log of `p_j · Π_{k,l} π[k, j, l]^count[k, l]` for every class j.
///
/// `item_counts` is one item's `[observers × classes]` slice.
pub fn log_class_scores(item_counts: ArrayView2<'_, f64>, params: &Parameters) -> Array1<f64> {
    let n_classes = params.class_marginals.len();
    Array1::from_shape_fn(n_classes, |j| {
        let prior = params.class_marginals[j];
        if prior <= 0.0 {
            return f64::NEG_INFINITY;
        }

        let mut score = prior.ln();
        for ((k, l), &count) in item_counts.indexed_iter() {
            if count == 0.0 {
                continue;
            }
            score += count * params.error_rates[[k, j, l]].ln();
        }
        score
    })
}

/// Numerically stable `log Σ exp(x)`; `-inf` when every term is `-inf`.
pub fn log_sum_exp(values: &Array1<f64>) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Check parameter shapes against the count tensor.
pub(crate) fn check_parameters(
    counts: &CountTensor,
    params: &Parameters,
    context: &'static str,
) -> Result<()> {
    let n_classes = counts.n_classes();
    EmError::check_shape(context, &[n_classes], params.class_marginals.shape())?;
    EmError::check_shape(
        context,
        &[counts.n_observers(), n_classes, n_classes],
        params.error_rates.shape(),
    )
}

/// Total log-likelihood `Σ_i log Σ_j p_j Π π^count`.
///
/// No blind-spot overrides apply here. Fails with `NonFiniteLikelihood` as
/// soon as the running total stops being finite.
pub fn log_likelihood(counts: &CountTensor, params: &Parameters) -> Result<f64> {
    check_parameters(counts, params, "likelihood parameters")?;

    let mut total = 0.0;
    for (item, item_counts) in counts.counts().outer_iter().enumerate() {
        let item_log_likelihood = log_sum_exp(&log_class_scores(item_counts, params));
        let next = total + item_log_likelihood;

        if !next.is_finite() {
            error!(
                item,
                previous = total,
                item_log_likelihood,
                total = next,
                "Log-likelihood became non-finite"
            );
            return Err(EmError::NonFiniteLikelihood {
                item,
                previous: total,
                item_log_likelihood,
                total: next,
            });
        }

        total = next;
    }

    Ok(total)
}
