//! Observation types for dawid-skene.
//!
//! K_i: These types represent the raw labels flowing into the EM core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of an item, e.g. a `(patient, visit)` key.
///
/// K_i: Opaque tuple key; only equality and display matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Vec<i64>);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

/// Identifier of a labeling source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(pub u32);

impl ObserverId {
    /// The single observer every parsed label is attributed to.
    pub const DEFAULT: Self = Self(1);
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One emitted label.
///
/// K_i: `gold` marks a trusted cross-check rather than a noisy label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Emitted class label (a value from the configured class list)
    pub class: i64,

    /// Whether this observation is a gold cross-check
    pub gold: bool,
}

impl Observation {
    pub fn noisy(class: i64) -> Self {
        Self { class, gold: false }
    }

    pub fn gold(class: i64) -> Self {
        Self { class, gold: true }
    }
}

/// All observations of one item, grouped by observer in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponses {
    pub item: ItemId,
    pub observers: Vec<(ObserverId, Vec<Observation>)>,
}

impl ItemResponses {
    fn push(&mut self, observer: ObserverId, observation: Observation) {
        match self.observers.iter_mut().find(|(id, _)| *id == observer) {
            Some((_, labels)) => labels.push(observation),
            None => self.observers.push((observer, vec![observation])),
        }
    }

    /// Total number of observations across observers.
    pub fn len(&self) -> usize {
        self.observers.iter().map(|(_, labels)| labels.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered mapping item → observer → observations.
///
/// K_i: Item order is insertion order; repeated items merge into one entry.
#[derive(Debug, Clone, Default)]
pub struct Responses {
    entries: Vec<ItemResponses>,
    index: HashMap<ItemId, usize>,
}

impl Responses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item without observations (keeps its position in the order).
    pub fn insert_item(&mut self, item: ItemId) -> &mut ItemResponses {
        let idx = match self.index.get(&item) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(item.clone(), idx);
                self.entries.push(ItemResponses {
                    item,
                    observers: Vec::new(),
                });
                idx
            }
        };
        &mut self.entries[idx]
    }

    /// Record one observation.
    pub fn record(&mut self, item: ItemId, observer: ObserverId, observation: Observation) {
        self.insert_item(item).push(observer, observation);
    }

    /// Items in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemResponses> {
        self.entries.iter()
    }

    pub fn get(&self, item: &ItemId) -> Option<&ItemResponses> {
        self.index.get(item).map(|&idx| &self.entries[idx])
    }

    /// Number of distinct items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of observations.
    pub fn observation_count(&self) -> usize {
        self.entries.iter().map(ItemResponses::len).sum()
    }
}
