//! Store errors

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`Store`](super::Store) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query document is malformed or uses an unsupported operator
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// `$regex` pattern failed to compile
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// Record to insert is not a mapping
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Update patch is malformed
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// `$where` names a predicate nobody registered
    #[error("Unknown $where predicate: {0}")]
    UnknownWherePredicate(String),

    /// Fixture file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fixture file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidSelector(_) => "STORE_INVALID_SELECTOR",
            StoreError::InvalidRegex { .. } => "STORE_INVALID_REGEX",
            StoreError::InvalidRecord(_) => "STORE_INVALID_RECORD",
            StoreError::InvalidPatch(_) => "STORE_INVALID_PATCH",
            StoreError::UnknownWherePredicate(_) => "STORE_UNKNOWN_WHERE",
            StoreError::Io(_) => "STORE_IO",
            StoreError::Json(_) => "STORE_JSON",
            StoreError::Internal(_) => "STORE_INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::InvalidSelector("x".into()).code(),
            "STORE_INVALID_SELECTOR"
        );
        assert_eq!(
            StoreError::UnknownWherePredicate("p".into()).code(),
            "STORE_UNKNOWN_WHERE"
        );
    }

    #[test]
    fn test_regex_error_display() {
        let err = StoreError::InvalidRegex {
            pattern: "(".into(),
            reason: "unclosed group".into(),
        };
        assert!(err.to_string().contains("'('"));
    }
}
