use thiserror::Error;

/// Result type for perdqn operations
pub type Result<T> = std::result::Result<T, DqnError>;

/// Main error type for the crate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DqnError {
    /// Sampling was attempted with fewer stored transitions than requested
    #[error("Insufficient data: requested a batch of {requested} but only {available} transitions are stored")]
    InsufficientData {
        requested: usize,
        available: usize,
    },

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Invalid action
    #[error("Invalid action {action}: must be less than {max_actions}")]
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// Sampled indices no longer refer to the transitions they were drawn from
    #[error("Stale batch: sampled at generation {sampled_at}, buffer is at generation {current}")]
    StaleBatch {
        sampled_at: u64,
        current: u64,
    },

    /// Empty buffer or container
    #[error("Empty buffer: {0}")]
    EmptyBuffer(String),

    /// Numerical computation errors
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Training error
    #[error("Training error: {0}")]
    TrainingError(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for DqnError {
    fn from(err: std::io::Error) -> Self {
        DqnError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for DqnError {
    fn from(err: bincode::Error) -> Self {
        DqnError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for DqnError {
    fn from(err: serde_json::Error) -> Self {
        DqnError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl DqnError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        DqnError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        DqnError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
