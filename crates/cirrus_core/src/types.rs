//! Core type definitions for Cirrus.

use crate::error::{CoreError, CoreResult};
use cirrus_codec::{generate_uuid, is_system_field, is_valid_identifier, parse_uuid, uuid_to_string, Uuid};
use std::fmt;

/// Name of the system class holding file records.
pub const FILE_CLASS: &str = "file__";

/// A normalized (lowercase) class name.
///
/// Always satisfies the identifier grammar, except for the reserved
/// system classes which end in `__` and can only be built inside this crate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassName(String);

impl ClassName {
    /// Validates and normalizes a class name.
    pub fn new(name: &str) -> CoreResult<Self> {
        normalize(name).map(Self)
    }

    pub(crate) fn file() -> Self {
        Self(FILE_CLASS.to_string())
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for reserved system classes.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0.ends_with("__")
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClassName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned object identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Parses the canonical hyphenated form, in either hex case.
    pub fn parse(s: &str) -> CoreResult<Self> {
        Ok(Self(parse_uuid(s)?))
    }

    /// Creates a new random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_uuid())
    }

    /// Wraps a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", uuid_to_string(&self.0))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&uuid_to_string(&self.0))
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

fn normalize(name: &str) -> CoreResult<String> {
    if is_valid_identifier(name) {
        Ok(name.to_ascii_lowercase())
    } else {
        Err(CoreError::invalid_identifier(name))
    }
}

/// Normalizes a field key for lookup. System keys are accepted.
pub fn normalize_key(key: &str) -> CoreResult<String> {
    normalize(key)
}

/// Normalizes a field key for writing. System keys are rejected.
pub fn writable_key(key: &str) -> CoreResult<String> {
    let key = normalize(key)?;
    if is_system_field(&key) {
        return Err(CoreError::reserved_field(key));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn class_name_normalizes() {
        let name = ClassName::new("GameScore").unwrap();
        assert_eq!(name.as_str(), "gamescore");
        assert_eq!(name, ClassName::new("gamescore").unwrap());
        assert!(!name.is_system());

        assert!(matches!(
            ClassName::new("file__"),
            Err(CoreError::InvalidIdentifier { .. })
        ));
        assert!(ClassName::file().is_system());
    }

    #[test]
    fn object_id_display_is_lowercase() {
        let id = ObjectId::parse("BE5BA3D0-971C-4418-9ECF-E2D1ABCB66BE").unwrap();
        assert_eq!(id.to_string(), "be5ba3d0-971c-4418-9ecf-e2d1abcb66be");
        assert_eq!(id, ObjectId::parse(&id.to_string()).unwrap());
        assert!(ObjectId::parse("nope").is_err());
    }

    #[test]
    fn writable_keys() {
        assert_eq!(writable_key("Score").unwrap(), "score");
        assert!(matches!(
            writable_key("ObjectId"),
            Err(CoreError::ReservedField { .. })
        ));
        assert!(matches!(
            writable_key("bad key"),
            Err(CoreError::InvalidIdentifier { .. })
        ));
        assert_eq!(normalize_key("CreatedAt").unwrap(), "createdat");
    }

    proptest! {
        #[test]
        fn normalized_keys_are_stable(key in "[a-zA-Z][a-zA-Z0-9]{0,20}") {
            let once = normalize_key(&key).unwrap();
            prop_assert_eq!(&once, &key.to_ascii_lowercase());
            prop_assert_eq!(normalize_key(&once).unwrap(), once.clone());
            let class_name = ClassName::new(&key).unwrap();
            prop_assert_eq!(class_name.as_str(), once.as_str());
        }
    }
}
