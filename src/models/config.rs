//! Configuration models for dawid-skene.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Top-level configuration for dawid-skene.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// EM iteration settings
    #[serde(default)]
    pub em: EmSettings,

    /// Input settings
    #[serde(default)]
    pub input: InputConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Known label types, looked up by name
    #[serde(default)]
    pub label_types: Vec<LabelType>,
}

/// EM loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmSettings {
    /// Convergence threshold on summed absolute parameter deltas
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Iteration bound (the loop stops once the iteration count exceeds it)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Strategy for the initial soft assignment
    #[serde(default)]
    pub init: InitStrategy,

    /// Seed for the random initializer (entropy-seeded when absent)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tolerance() -> f64 {
    1e-5
}

fn default_max_iterations() -> usize {
    100
}

impl Default for EmSettings {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            init: InitStrategy::default(),
            seed: None,
        }
    }
}

/// Strategy for the initial item class posterior.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InitStrategy {
    /// Per-class proportion of all observations (default)
    #[default]
    Average,
    /// One class drawn per item, weighted by the per-class proportions
    Random,
    /// Most frequent class, ties to the lowest class index
    Majority,
}

impl std::fmt::Display for InitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Average => "average",
            Self::Random => "random",
            Self::Majority => "majority",
        };
        f.write_str(name)
    }
}

/// Override policy carried by a label type (`am_noise` in config files).
///
/// K_i: Only 0 and 2 activate blind-spot overrides; everything else leaves
/// the model purely probabilistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NoiseModel {
    /// `0`: any observed class-1 label is trusted, and true class 0 is never mislabeled
    PositiveEvidence,
    /// `1`: no overrides
    Unconstrained,
    /// `2`: a gold class-1 observation forces class 1
    GoldEvidence,
    /// Any other value; behaves like `Unconstrained`
    Unrecognized(u8),
}

impl NoiseModel {
    /// Whether items with any class-1 count are forced to class 1.
    pub fn trusts_positive_labels(self) -> bool {
        matches!(self, Self::PositiveEvidence)
    }

    /// Whether items with gold class-1 evidence are forced to class 1.
    pub fn trusts_gold_labels(self) -> bool {
        matches!(self, Self::GoldEvidence)
    }

    /// Whether true class 0 has a fixed, error-free confusion row.
    pub fn pins_negative_class(self) -> bool {
        matches!(self, Self::PositiveEvidence)
    }
}

impl From<u8> for NoiseModel {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::PositiveEvidence,
            1 => Self::Unconstrained,
            2 => Self::GoldEvidence,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<NoiseModel> for u8 {
    fn from(value: NoiseModel) -> Self {
        match value {
            NoiseModel::PositiveEvidence => 0,
            NoiseModel::Unconstrained => 1,
            NoiseModel::GoldEvidence => 2,
            NoiseModel::Unrecognized(other) => other,
        }
    }
}

/// A named label type and the override policy it selects.
///
/// K_i: Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelType {
    /// Name used on the command line
    pub name: String,

    /// Override policy
    pub am_noise: NoiseModel,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl LabelType {
    pub fn new(name: impl Into<String>, am_noise: NoiseModel) -> Self {
        Self {
            name: name.into(),
            am_noise,
            description: None,
        }
    }
}

/// Input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Valid class labels, `[0, 1, .., C-1]`; each label is its own class index
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            classes: default_classes(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Format of the per-item label file
    #[serde(default)]
    pub format: OutputFormat,

    /// Optional path for a JSON run report
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// Per-item label file format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[k1, k2],<label>,<weight>` lines
    #[default]
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve a label type by name.
    ///
    /// B_i(label type configured) → Result
    pub fn label_type(&self, name: &str) -> Result<&LabelType, ConfigError> {
        self.label_types
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::LabelTypeNotFound(name.to_string()))
    }

    /// Validate value ranges and uniqueness constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.em.tolerance.is_finite() && self.em.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "em.tolerance must be a positive number, got {}",
                self.em.tolerance
            )));
        }

        if self.input.classes.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "input.classes needs at least two classes, got {}",
                self.input.classes.len()
            )));
        }

        let dense = self
            .input
            .classes
            .iter()
            .zip(0i64..)
            .all(|(&class, idx)| class == idx);
        if !dense {
            return Err(ConfigError::Invalid(format!(
                "input.classes must be [0, 1, .., C-1], got {:?}",
                self.input.classes
            )));
        }

        let mut names = HashSet::new();
        for label_type in &self.label_types {
            if !names.insert(label_type.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "label type '{}' is defined more than once",
                    label_type.name
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing or inconsistent values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Label type not found: '{0}' (not configured in [[label_types]])")]
    LabelTypeNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
