//! Initial soft assignment of items to classes.
//!
//! K_i: Blind-spot items are forced to the positive class before any
//! strategy looks at their counts.
//! I^R: The strategy (average, random, majority) is configurable.

use super::counts::{CountTensor, positive_row};
use crate::models::{InitStrategy, LabelType};
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::debug;

/// Initial posterior and the items forced by the blind-spot override.
#[derive(Debug, Clone)]
pub struct Initialization {
    /// `[items × classes]`
    pub posterior: Array2<f64>,

    /// Indices of items forced to the positive class
    pub reviewed_blind_spots: Vec<usize>,
}

/// Build the initial item class posterior.
///
/// Items without any observation keep an all-zero row under `Average` and
/// `Random`; `Majority` treats their all-zero totals as a tie.
pub fn initialize<R: Rng + ?Sized>(
    counts: &CountTensor,
    label_type: &LabelType,
    strategy: InitStrategy,
    rng: &mut R,
) -> Initialization {
    let response_sums = counts.response_sums();
    let mut posterior = Array2::<f64>::zeros((counts.n_items(), counts.n_classes()));
    let mut reviewed_blind_spots = Vec::new();

    for (item, totals) in response_sums.rows().into_iter().enumerate() {
        if counts.is_blind_spot(item, label_type.am_noise) {
            reviewed_blind_spots.push(item);
            posterior
                .row_mut(item)
                .assign(&positive_row(counts.n_classes()));
            continue;
        }

        let mut row = posterior.row_mut(item);
        match strategy {
            InitStrategy::Average => {
                let total = totals.sum();
                if total > 0.0 {
                    row.assign(&(&totals / total));
                }
            }
            InitStrategy::Random => {
                if let Some(class) = draw_class(totals, rng) {
                    row[class] = 1.0;
                }
            }
            InitStrategy::Majority => {
                row[majority_class(totals)] = 1.0;
            }
        }
    }

    debug!(
        strategy = %strategy,
        blind_spots = reviewed_blind_spots.len(),
        "Initialized posterior"
    );

    Initialization {
        posterior,
        reviewed_blind_spots,
    }
}

/// Draw one class index weighted by the per-class totals.
///
/// Returns `None` when the item has no observations.
fn draw_class<R: Rng + ?Sized>(totals: ArrayView1<'_, f64>, rng: &mut R) -> Option<usize> {
    let weights = WeightedIndex::<f64>::new(totals.iter()).ok()?;
    Some(weights.sample(rng))
}

/// Index of the largest total; ties go to the lowest index.
fn majority_class(totals: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (class, &total) in totals.iter().enumerate() {
        if total > totals[best] {
            best = class;
        }
    }
    best
}
