//! Count aggregation: responses → count tensor + gold evidence.
//!
//! K_i: Computed once per run and read-only afterwards.

use crate::models::{EmError, ItemId, NoiseModel, ObserverId, Responses, Result};
use ndarray::{Array1, Array2, Array3, Axis, s};
use tracing::debug;

/// Class forced by blind-spot overrides and tracked by gold evidence.
///
/// Class lists are dense (`[0, 1, .., C-1]`), so this is both the class value
/// and its index.
pub const POSITIVE_CLASS: usize = 1;

/// Check that `classes` is the dense list `[0, 1, .., C-1]` with `C >= 2`.
pub fn check_classes(classes: &[i64]) -> Result<()> {
    if classes.len() < 2 {
        return Err(EmError::TooFewClasses(classes.len()));
    }
    let dense = classes
        .iter()
        .enumerate()
        .all(|(idx, &class)| i64::try_from(idx).is_ok_and(|idx| idx == class));
    if !dense {
        return Err(EmError::InvalidInput(format!(
            "classes must be [0, 1, .., C-1], got {classes:?}"
        )));
    }
    Ok(())
}

/// Dense label counts plus the gold evidence derived from them.
#[derive(Debug, Clone)]
pub struct CountTensor {
    items: Vec<ItemId>,
    observers: Vec<ObserverId>,
    classes: Vec<i64>,
    /// `[items × observers × classes]`
    counts: Array3<f64>,
    /// `[items]`, set once any gold observation asserts the positive class
    gold: Array1<bool>,
}

impl CountTensor {
    /// Aggregate responses into counts.
    ///
    /// Observers are indexed in first-seen order across a single pass over the
    /// items. A label outside `classes` is an input-contract violation.
    pub fn from_responses(responses: &Responses, classes: &[i64]) -> Result<Self> {
        check_classes(classes)?;
        if responses.is_empty() {
            return Err(EmError::InvalidInput("no items to aggregate".to_string()));
        }

        let items: Vec<ItemId> = responses.iter().map(|r| r.item.clone()).collect();
        let mut observers: Vec<ObserverId> = Vec::new();
        for entry in responses.iter() {
            for (observer, _) in &entry.observers {
                if !observers.contains(observer) {
                    observers.push(*observer);
                }
            }
        }

        let mut counts = Array3::<f64>::zeros((items.len(), observers.len(), classes.len()));
        let mut gold = Array1::from_elem(items.len(), false);

        for (i, entry) in responses.iter().enumerate() {
            for (observer, labels) in &entry.observers {
                let k = observers
                    .iter()
                    .position(|o| o == observer)
                    .ok_or_else(|| EmError::Internal(format!("observer {observer} not indexed")))?;

                for observation in labels {
                    let j = classes
                        .iter()
                        .position(|&c| c == observation.class)
                        .ok_or_else(|| EmError::UnknownClass {
                            item: entry.item.to_string(),
                            label: observation.class,
                        })?;

                    counts[[i, k, j]] += 1.0;
                    if j == POSITIVE_CLASS && observation.gold {
                        gold[i] = true;
                    }
                }
            }
        }

        debug!(
            items = items.len(),
            observers = observers.len(),
            classes = classes.len(),
            gold_items = gold.iter().filter(|&&g| g).count(),
            "Aggregated counts"
        );

        Ok(Self {
            items,
            observers,
            classes: classes.to_vec(),
            counts,
            gold,
        })
    }

    /// Wrap an existing count tensor.
    ///
    /// Items are named `[i]`, observers `1..=K`, classes `0..C`.
    pub fn from_counts(counts: Array3<f64>, gold: Array1<bool>) -> Result<Self> {
        let (n_items, n_observers, n_classes) = counts.dim();
        if n_classes < 2 {
            return Err(EmError::TooFewClasses(n_classes));
        }
        if n_items == 0 {
            return Err(EmError::InvalidInput("no items to aggregate".to_string()));
        }
        EmError::check_shape("gold evidence", &[n_items], gold.shape())?;
        if counts.iter().any(|&c| !(c.is_finite() && c >= 0.0)) {
            return Err(EmError::InvalidInput(
                "counts must be finite and non-negative".to_string(),
            ));
        }

        let items = (0..n_items)
            .map(|i| i64::try_from(i).map(|i| ItemId(vec![i])))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| EmError::InvalidInput(format!("too many items: {n_items}")))?;
        let observers = (1..=n_observers)
            .map(|k| u32::try_from(k).map(ObserverId))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| EmError::InvalidInput(format!("too many observers: {n_observers}")))?;
        let classes = (0..n_classes)
            .map(i64::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| EmError::InvalidInput(format!("too many classes: {n_classes}")))?;

        Ok(Self {
            items,
            observers,
            classes,
            counts,
            gold,
        })
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn observers(&self) -> &[ObserverId] {
        &self.observers
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// `[items × observers × classes]`
    pub fn counts(&self) -> &Array3<f64> {
        &self.counts
    }

    /// `[items]`
    pub fn gold(&self) -> &Array1<bool> {
        &self.gold
    }

    pub fn n_items(&self) -> usize {
        self.counts.dim().0
    }

    pub fn n_observers(&self) -> usize {
        self.counts.dim().1
    }

    pub fn n_classes(&self) -> usize {
        self.counts.dim().2
    }

    /// Per-item class totals summed over observers, `[items × classes]`.
    pub fn response_sums(&self) -> Array2<f64> {
        self.counts.sum_axis(Axis(1))
    }

    /// Whether the item's true class is forced to the positive class.
    ///
    /// Triggered by any positive-class count under `PositiveEvidence`, or by
    /// gold evidence under `GoldEvidence`.
    pub fn is_blind_spot(&self, item: usize, noise: NoiseModel) -> bool {
        (noise.trusts_positive_labels()
            && self.counts.slice(s![item, .., POSITIVE_CLASS]).sum() > 0.0)
            || (noise.trusts_gold_labels() && self.gold[item])
    }
}

/// Posterior row with all mass on the positive class.
pub(crate) fn positive_row(n_classes: usize) -> Array1<f64> {
    let mut row = Array1::zeros(n_classes);
    row[POSITIVE_CLASS] = 1.0;
    row
}
