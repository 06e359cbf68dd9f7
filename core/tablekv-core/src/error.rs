//! Error types for tablekv.
//!
//! All public APIs return `TkvResult<T>`. Library code does not panic.

use thiserror::Error;

/// Unified error type for all table operations.
#[derive(Debug, Error)]
pub enum TkvError {
    /// Requested key does not exist
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Stored value is shorter than its type tag requires
    #[error("insufficient data for {tag}: expected {expected} bytes, got {actual}")]
    InsufficientData {
        tag: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Value kind or tag byte with no codec rule
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Decode destination cannot hold the stored value
    #[error("cannot decode {actual} into column '{column}' of type {expected}")]
    DestinationMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Table, column or owner name that would break the key scheme
    #[error("invalid {kind} name {name:?}: must be non-empty and contain no '.'")]
    InvalidIdentifier { kind: &'static str, name: String },

    /// Column name not declared by the record type
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// Row sequence could not be acquired or advanced
    #[error("sequence allocation failed for '{key}': {reason}")]
    AllocationFailed { key: String, reason: String },

    /// Substrate read/write transaction error
    #[error("transaction failed: {source}")]
    TransactionFailed {
        #[from]
        source: sled::Error,
    },

    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result type alias for all table operations.
pub type TkvResult<T> = Result<T, TkvError>;

impl From<serde_json::Error> for TkvError {
    fn from(err: serde_json::Error) -> Self {
        TkvError::Serialization(err.to_string())
    }
}

impl TkvError {
    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        TkvError::NotFound { key: key.into() }
    }

    /// Returns true for [`TkvError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, TkvError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_found() {
        let err = TkvError::not_found("fruit.name.root.0");
        assert_eq!(err.to_string(), "key not found: fruit.name.root.0");
        assert!(err.is_not_found());
    }

    #[test]
    fn error_display_insufficient_data() {
        let err = TkvError::InsufficientData {
            tag: "u32",
            expected: 4,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for u32: expected 4 bytes, got 2"
        );
    }

    #[test]
    fn error_display_destination_mismatch() {
        let err = TkvError::DestinationMismatch {
            column: "size".to_string(),
            expected: "i32",
            actual: "string",
        };
        assert!(err.to_string().contains("'size'"));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn error_display_allocation_failed() {
        let err = TkvError::AllocationFailed {
            key: "root.fruit".to_string(),
            reason: "allocator released".to_string(),
        };
        assert!(err.to_string().contains("root.fruit"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn error_display_invalid_identifier() {
        let err = TkvError::InvalidIdentifier {
            kind: "owner",
            name: "root.x".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid owner name \"root.x\": must be non-empty and contain no '.'"
        );
    }

    #[test]
    fn serde_json_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TkvError = parse.into();
        assert!(matches!(err, TkvError::Serialization(_)));
    }
}
