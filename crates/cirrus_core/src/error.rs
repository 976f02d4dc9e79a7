//! Error types for Cirrus core.

use cirrus_codec::{CodecError, TypeTag};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised locally, before any I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Value validation or encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Class name or field key violates the identifier grammar.
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected identifier.
        name: String,
    },

    /// System fields cannot be set by clients.
    #[error("field {key:?} is reserved")]
    ReservedField {
        /// The reserved key.
        key: String,
    },

    /// Value type differs from the type the field was last synced with.
    #[error("type conflict on field {key:?}: synced as {expected}, got {actual}")]
    TypeConflict {
        /// Field key.
        key: String,
        /// Synced type.
        expected: TypeTag,
        /// Type of the rejected value.
        actual: TypeTag,
    },

    /// Field has no value.
    #[error("field {key:?} has no value")]
    MissingField {
        /// Field key.
        key: String,
    },

    /// The sort chain is full.
    #[error("at most {max} sort keys are allowed")]
    SortLimitExceeded {
        /// Maximum number of sort keys.
        max: usize,
    },

    /// Operation not permitted in the object's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid identifier error.
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    /// Creates a reserved field error.
    pub fn reserved_field(key: impl Into<String>) -> Self {
        Self::ReservedField { key: key.into() }
    }

    /// Creates a missing field error.
    pub fn missing_field(key: impl Into<String>) -> Self {
        Self::MissingField { key: key.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for type conflicts, false for grammar and other
    /// validation errors.
    pub fn is_type_conflict(&self) -> bool {
        matches!(self, CoreError::TypeConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::TypeConflict {
            key: "score".into(),
            expected: TypeTag::Int32,
            actual: TypeTag::String,
        };
        assert_eq!(
            err.to_string(),
            "type conflict on field \"score\": synced as int32, got string"
        );
        assert!(err.is_type_conflict());

        let err = CoreError::SortLimitExceeded { max: 5 };
        assert_eq!(err.to_string(), "at most 5 sort keys are allowed");
        assert!(!err.is_type_conflict());
    }

    #[test]
    fn codec_errors_convert() {
        let err: CoreError = CodecError::NonFiniteFloat.into();
        assert!(matches!(err, CoreError::Codec(CodecError::NonFiniteFloat)));
    }
}
