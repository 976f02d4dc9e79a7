//! Identifier and UUID grammar shared by class names, field keys and object ids.

use crate::error::{CodecError, CodecResult};
use uuid::Uuid;

/// Field key of the server-assigned object id.
pub const OBJECT_ID_KEY: &str = "objectid";
/// Field key of the server-assigned creation timestamp.
pub const CREATED_AT_KEY: &str = "createdat";
/// Field key of the server-assigned update timestamp.
pub const UPDATED_AT_KEY: &str = "updatedat";

/// System fields, never settable by clients.
pub const SYSTEM_FIELDS: [&str; 3] = [OBJECT_ID_KEY, CREATED_AT_KEY, UPDATED_AT_KEY];

/// Returns true if `s` is a letter followed by letters, digits or
/// underscores, and does not end in `__`.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    !s.ends_with("__")
}

/// Validates `s` and returns its lowercase form.
pub fn normalize_identifier(s: &str) -> CodecResult<String> {
    if is_valid_identifier(s) {
        Ok(s.to_ascii_lowercase())
    } else {
        Err(CodecError::invalid_identifier(s))
    }
}

/// Returns true if the (already normalized) key is a system field.
pub fn is_system_field(key: &str) -> bool {
    SYSTEM_FIELDS.contains(&key)
}

/// Returns true if `s` has the hyphenated 8-4-4-4-12 hex layout.
///
/// Either hex case is accepted; [`parse_uuid`] normalizes to lowercase.
pub fn is_valid_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

/// Parses a canonical hyphenated UUID. Never attempts a best-effort parse
/// of other layouts (braced, URN or simple forms are rejected).
pub fn parse_uuid(s: &str) -> CodecResult<Uuid> {
    if !is_valid_uuid(s) {
        return Err(CodecError::invalid_uuid(s));
    }
    Uuid::parse_str(s).map_err(|_| CodecError::invalid_uuid(s))
}

/// Renders a UUID in its canonical lowercase hyphenated form.
pub fn uuid_to_string(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}

/// Generates a new random (v4) UUID.
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}
