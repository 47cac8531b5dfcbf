//! Error types for host functions and value projection

/// Result type for host-side operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised on the host side of the boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Invalid argument passed to a host function
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Table key that cannot be projected (only integers and strings can)
    #[error("Unsupported table key: {0}")]
    UnsupportedKey(String),

    /// Table nesting exceeded the projection depth limit
    #[error("Table nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    /// Context map is full
    #[error("map size limit {0}")]
    MapLimit(usize),

    /// Table view used in a way its shape does not allow
    #[error("Table error: {0}")]
    TableError(String),

    /// Host-defined failure
    #[error("{0}")]
    Message(String),
}

impl BridgeError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Message(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Message(s.to_string())
    }
}
