//! Error types for dawid-skene.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad input, unknown label type)
//! - I^B materialized: Numerical degeneracy (non-finite likelihood)
//! - K_i violated: Internal invariant violations (tensor shapes, bugs)

use thiserror::Error;

/// Top-level error type for dawid-skene.
#[derive(Debug, Error)]
pub enum EmError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown class label {label} for item {item} (not in the configured class list)")]
    UnknownClass { item: String, label: i64 },

    #[error("At least two classes are required, got {0}")]
    TooFewClasses(usize),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Degenerate parameter state
    // ═══════════════════════════════════════════════════════════════════

    #[error(
        "Non-finite log-likelihood at item {item}: previous total {previous}, \
         item term {item_log_likelihood}, new total {total}"
    )]
    NonFiniteLikelihood {
        item: usize,
        previous: f64,
        item_log_likelihood: f64,
        total: f64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check a tensor shape against the expected one.
    pub fn check_shape(context: &'static str, expected: &[usize], found: &[usize]) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(Self::ShapeMismatch {
                context,
                expected: expected.to_vec(),
                found: found.to_vec(),
            })
        }
    }

    /// Whether this error reflects a degenerate parameter state rather than bad input.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::NonFiniteLikelihood { .. })
    }
}

/// Result type alias for dawid-skene.
pub type Result<T> = std::result::Result<T, EmError>;
