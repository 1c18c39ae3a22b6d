//! E-step: item class posterior from the current parameters.

use super::counts::{CountTensor, positive_row};
use super::likelihood::{check_parameters, log_class_scores};
use crate::models::{LabelType, Parameters, Result};
use ndarray::Array2;

/// Recompute the item class posterior, `[items × classes]`.
///
/// Blind-spot items get all mass on the positive class. Every other row is
/// `p_j · Π π[k, j, l]^count` normalized over j, or all-zero when no class
/// has any likelihood.
pub fn e_step(
    counts: &CountTensor,
    params: &Parameters,
    label_type: &LabelType,
) -> Result<Array2<f64>> {
    check_parameters(counts, params, "e-step parameters")?;

    let n_classes = counts.n_classes();
    let mut posterior = Array2::<f64>::zeros((counts.n_items(), n_classes));

    for (item, item_counts) in counts.counts().outer_iter().enumerate() {
        let mut row = posterior.row_mut(item);

        if counts.is_blind_spot(item, label_type.am_noise) {
            row.assign(&positive_row(n_classes));
            continue;
        }

        let scores = log_class_scores(item_counts, params);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            continue;
        }

        // Shifting by the max leaves the normalized row unchanged.
        let weights = scores.mapv(|s| (s - max).exp());
        let total = weights.sum();
        if total > 0.0 {
            row.assign(&(weights / total));
        }
    }

    Ok(posterior)
}
