//! M-step: class marginals and observer error rates from the current posterior.

use super::counts::CountTensor;
use crate::models::{EmError, LabelType, Parameters, Result};
use ndarray::{Array2, Array3, Axis, s};

/// Re-estimate class marginals and error rates.
///
/// - marginals: column mean of the posterior, `[classes]`
/// - error rates: soft counts `Σ_i posterior[i, j] · counts[i, k, l]`, each
///   `[k, j, :]` row normalized to sum 1, or left all-zero when it has no mass
///
/// When the label type pins the negative class, `[k, 0, :]` is fixed to
/// "always emits class 0" for every observer.
pub fn m_step(
    counts: &CountTensor,
    posterior: &Array2<f64>,
    label_type: &LabelType,
) -> Result<Parameters> {
    let n_items = counts.n_items();
    let n_observers = counts.n_observers();
    let n_classes = counts.n_classes();
    EmError::check_shape("m-step posterior", &[n_items, n_classes], posterior.shape())?;

    let class_marginals = posterior
        .mean_axis(Axis(0))
        .ok_or_else(|| EmError::InvalidInput("cannot estimate marginals without items".into()))?;

    let mut error_rates = Array3::<f64>::zeros((n_observers, n_classes, n_classes));
    let tensor = counts.counts();

    for k in 0..n_observers {
        for j in 0..n_classes {
            let mut row = error_rates.slice_mut(s![k, j, ..]);

            if j == 0 && label_type.am_noise.pins_negative_class() {
                row[0] = 1.0;
                continue;
            }

            let belief = posterior.column(j);
            for (l, rate) in row.iter_mut().enumerate() {
                *rate = belief.dot(&tensor.slice(s![.., k, l]));
            }

            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
    }

    Ok(Parameters {
        class_marginals,
        error_rates,
    })
}
