use thiserror::Error;

/// Result type for shiftnet operations
pub type Result<T> = std::result::Result<T, NetError>;

/// Main error type for the network factory
#[derive(Debug, Clone, Error)]
pub enum NetError {
    /// A name (architecture, norm, init method, lr policy) with no implementation
    #[error("{kind} [{name}] is not implemented")]
    NotImplemented {
        kind: String,
        name: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Requested compute device is unavailable or listed twice
    #[error("Device error: {0}")]
    Device(String),

    /// Numerical computation errors
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A layer was run before the state it depends on was set
    #[error("Missing state: {0}")]
    MissingState(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        NetError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl NetError {
    pub fn not_implemented<S: Into<String>>(kind: S, name: S) -> Self {
        NetError::NotImplemented {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        NetError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        NetError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        NetError::MissingState(format!("{} lock poisoned", what))
    }
}
