//! Error types for the Convoy execution core.
//!
//! All public APIs return `ConvoyResult<T>` — no panics in library code.
//! Invariant violations get their own loud variant instead of corrupting
//! state silently.

use thiserror::Error;

/// Unified error type for all Convoy operations.
#[derive(Debug, Error)]
pub enum ConvoyError {
    /// Programming-bug class invariant violation (e.g. writing the same
    /// column twice before a row completes). Not recoverable.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Row or column index past the end of a batch or buffer. Catchable,
    /// unlike [`ConvoyError::ProtocolViolation`].
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Type mismatch between a column's type and an appended/bound value.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Operator lifecycle misuse (fetch before init, init twice, ...).
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },

    /// Storage layer error from the SQLite sink or scan path.
    #[error("storage error: {source}")]
    Storage {
        #[from]
        source: rusqlite::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Wire serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed or out-of-protocol network input, rejected by the
    /// validation stage before reaching any handler.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Fault deliberately raised by a failure injector. Consumed by
    /// fault-recovery logic outside this core.
    #[error("injected failure: {0}")]
    InjectedFailure(String),

    /// Cooperative shutdown signal, not an application error.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Requested relation does not exist in the catalog.
    #[error("relation '{0}' not found")]
    RelationNotFound(String),

    /// Registry lookup for an unregistered predicate type tag.
    #[error("predicate type '{0}' not registered")]
    UnknownPredicate(String),

    /// Invalid or missing configuration arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Result type alias for all Convoy operations.
pub type ConvoyResult<T> = Result<T, ConvoyError>;

impl From<Box<bincode::ErrorKind>> for ConvoyError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ConvoyError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ConvoyError {
    fn from(err: serde_json::Error) -> Self {
        ConvoyError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_protocol_violation() {
        let err = ConvoyError::ProtocolViolation("column 2 written twice".to_string());
        assert_eq!(err.to_string(), "protocol violation: column 2 written twice");
    }

    #[test]
    fn error_display_out_of_bounds() {
        let err = ConvoyError::IndexOutOfBounds { index: 7, len: 3 };
        assert_eq!(err.to_string(), "index 7 out of bounds (len 3)");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = ConvoyError::TypeMismatch {
            expected: "Long".to_string(),
            actual: "Str".to_string(),
        };
        assert_eq!(err.to_string(), "type mismatch: expected Long, got Str");
    }

    #[test]
    fn error_display_injected_failure() {
        let err = ConvoyError::InjectedFailure("injector #1".to_string());
        assert!(err.to_string().contains("injected failure"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        let err: ConvoyError = io.into();
        assert!(matches!(err, ConvoyError::Io { .. }));
    }
}
