//! Error types for guidance composition
//!
//! None of these escape the hooks: a failed composition step falls back to
//! the backend's own combination and is reported as a diagnostic.

/// Inconsistency between prompt trees and backend inputs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// Leaf position past the end of an item's condition list
    #[error("condition index {index} out of range for {len} conditions")]
    CondIndexOutOfRange {
        /// Requested leaf position
        index: usize,
        /// Conditions the item has
        len: usize,
    },

    /// Condition points past the end of `x_out`
    #[error("row {row} out of range for {len} predictions")]
    RowOutOfRange {
        /// Requested row
        row: usize,
        /// Rows in `x_out`
        len: usize,
    },

    /// Prediction rows disagree in shape
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the unconditioned row
        expected: Vec<usize>,
        /// Shape of the offending row
        actual: Vec<usize>,
    },

    /// Number of stored trees differs from the batch
    #[error("batch mismatch: {trees} prompt trees for {items} batch items")]
    BatchMismatch {
        /// Trees stored at prepare time
        trees: usize,
        /// Items in the batch
        items: usize,
    },

    /// Tree leaf count differs from the item's condition count
    #[error("batch item {batch_index}: tree has {expected} leaves, backend sent {actual} conditions")]
    LeafCountMismatch {
        /// Item within the batch
        batch_index: usize,
        /// Leaves in the item's tree
        expected: usize,
        /// Conditions the backend sent
        actual: usize,
    },

    /// Backend returned the wrong number of outputs
    #[error("backend returned {actual} outputs, expected {expected}")]
    BackendOutput {
        /// Batch size
        expected: usize,
        /// Outputs received
        actual: usize,
    },
}

impl CompositionError {
    /// Create shape mismatch error from two shapes
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Result alias for composition steps
pub(crate) type Result<T> = std::result::Result<T, CompositionError>;

/// Invalid configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML text could not be decoded
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Numeric field outside `[0, 1]`
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Config field name
        field: &'static str,
        /// Rejected value
        value: f32,
    },
}
