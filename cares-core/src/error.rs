//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaresError {
    /// A transition with a different number of fields than the first one was added.
    #[error("Arity mismatch: expected {expected} extra fields, got {got}")]
    ArityMismatch {
        /// Number of extra fields fixed at the first `add`.
        expected: usize,
        /// Number of extra fields of the rejected transition.
        got: usize,
    },

    /// A vector field has a different length than the one fixed at the first `add`.
    #[error("Dimension mismatch for {field}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Name of the field.
        field: String,
        /// Expected dimension.
        expected: usize,
        /// Given dimension.
        got: usize,
    },

    /// Sampling from a buffer without any transition.
    #[error("The buffer is empty")]
    EmptyBuffer,

    /// Sampling from a sum tree whose total priority is not positive.
    #[error("Total priority mass is zero")]
    ZeroPriorityMass,

    /// A negative or NaN priority.
    #[error("Invalid priority {priority} at index {index}")]
    InvalidPriority {
        /// Leaf index.
        index: usize,
        /// Rejected value.
        priority: f64,
    },

    /// Not enough non-terminal transitions for consecutive sampling.
    #[error("Requested {requested} consecutive samples, only {available} candidates")]
    InsufficientNonTerminal {
        /// Requested batch size.
        requested: usize,
        /// Number of valid candidates.
        available: usize,
    },

    /// An index outside the valid range of a sum tree or of the stored transitions.
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of valid indices.
        len: usize,
    },

    /// Two slices that should be paired have different lengths.
    #[error("Length mismatch: {0} != {1}")]
    LengthMismatch(usize, usize),

    /// A configuration value outside its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No constructor is registered for the name.
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Normalization statistics were used before being set.
    #[error("Statistics are not set")]
    StatisticsNotSet,

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
