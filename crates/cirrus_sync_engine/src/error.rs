//! Error types for the sync engine.

use cirrus_codec::CodecError;
use cirrus_core::CoreError;
use cirrus_protocol::{FailureKind, ServerFailure};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by round trips to the remote store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Grammar or type error detected locally. No request was sent.
    #[error("validation error: {0}")]
    Validation(#[from] CoreError),

    /// Value could not be encoded. No request was sent.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Target row does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// Transport failure.
    #[error("network error: {message}")]
    Network {
        /// Underlying cause reported by the transport.
        message: String,
    },

    /// A value disagrees with the backend column type. Nothing was written.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Offending column and types.
        message: String,
    },

    /// Credentials rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend refused the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Background task running a blocking call panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Returns true if the failure was detected before any I/O.
    pub fn is_local(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::Codec(_))
    }

    /// Returns true for not found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }
}

impl From<ServerFailure> for SyncError {
    fn from(failure: ServerFailure) -> Self {
        match failure.kind {
            FailureKind::NotFound => SyncError::not_found(failure.message),
            FailureKind::TypeMismatch => SyncError::type_mismatch(failure.message),
            FailureKind::InvalidRequest => SyncError::InvalidRequest(failure.message),
            FailureKind::Unauthorized => SyncError::Unauthorized(failure.message),
            FailureKind::Internal => SyncError::Protocol(failure.message),
        }
    }
}

impl From<&SyncError> for ServerFailure {
    fn from(error: &SyncError) -> Self {
        let kind = match error {
            SyncError::NotFound { .. } => FailureKind::NotFound,
            SyncError::TypeMismatch { .. } => FailureKind::TypeMismatch,
            SyncError::Unauthorized(_) => FailureKind::Unauthorized,
            SyncError::Validation(_) | SyncError::Codec(_) | SyncError::InvalidRequest(_) => {
                FailureKind::InvalidRequest
            }
            SyncError::Network { .. } | SyncError::Protocol(_) | SyncError::TaskFailed(_) => {
                FailureKind::Internal
            }
        };
        let message = match error {
            SyncError::NotFound { message }
            | SyncError::Network { message }
            | SyncError::TypeMismatch { message } => message.clone(),
            SyncError::Unauthorized(message)
            | SyncError::InvalidRequest(message)
            | SyncError::Protocol(message)
            | SyncError::TaskFailed(message) => message.clone(),
            SyncError::Validation(e) => e.to_string(),
            SyncError::Codec(e) => e.to_string(),
        };
        ServerFailure::new(kind, message)
    }
}
