//! Error types for the codec crate.

use crate::value::TypeTag;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while validating or encoding values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Identifier does not follow the class/field grammar.
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected identifier.
        name: String,
    },

    /// String is not a canonical hyphenated UUID.
    #[error("invalid UUID: {input:?}")]
    InvalidUuid {
        /// The rejected input.
        input: String,
    },

    /// String does not match the fixed date format.
    #[error("invalid date {input:?}: {message}")]
    InvalidDate {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        message: String,
    },

    /// Instant cannot be represented.
    #[error("date out of range: {millis} ms")]
    DateOutOfRange {
        /// Milliseconds since the Unix epoch.
        millis: i64,
    },

    /// Latitude or longitude outside the valid range.
    #[error("geo point out of range: latitude={latitude}, longitude={longitude}")]
    GeoOutOfRange {
        /// Supplied latitude.
        latitude: f64,
        /// Supplied longitude.
        longitude: f64,
    },

    /// NaN and infinite floats are forbidden.
    #[error("non-finite float values are forbidden")]
    NonFiniteFloat,

    /// The unsupported sentinel cannot be written by clients.
    #[error("unsupported values cannot be written")]
    UnsupportedValue,

    /// Wire payload does not match the declared type.
    #[error("wire value does not match type {expected}: {message}")]
    WireMismatch {
        /// Declared type of the payload.
        expected: TypeTag,
        /// Description of the mismatch.
        message: String,
    },

    /// Failed to encode a message.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a message.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid identifier error.
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    /// Create an invalid UUID error.
    pub fn invalid_uuid(input: impl Into<String>) -> Self {
        Self::InvalidUuid {
            input: input.into(),
        }
    }

    /// Create a wire mismatch error.
    pub fn wire_mismatch(expected: TypeTag, message: impl Into<String>) -> Self {
        Self::WireMismatch {
            expected,
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
