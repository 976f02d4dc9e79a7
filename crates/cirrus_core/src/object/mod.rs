//! Schema-flexible cloud objects with change tracking.

mod file;

pub use file::{FileRecord, FileStatus};

use crate::error::{CoreError, CoreResult};
use crate::types::{writable_key, ClassName, ObjectId};
use cirrus_codec::{
    parse_uuid, CloudDate, TypeTag, Value, ValueSet, CREATED_AT_KEY, OBJECT_ID_KEY,
    UPDATED_AT_KEY,
};
use cirrus_protocol::{CreateResponse, FieldChange, FieldDelta, FieldMap, ObjectRecord};
use std::collections::{BTreeMap, BTreeSet};

/// One row of a class, held in memory.
///
/// Setters validate the key grammar and the value type, then record the
/// key in the dirty-set. Only the sync hooks (`apply_*`, [`reset`]) touch
/// identity, timestamps or the synced schema, and the engine calls them
/// only after a successful round trip.
///
/// A `CloudObject` is not internally synchronized. Share it through
/// [`SharedObject`](crate::SharedObject) when several threads need it.
///
/// [`reset`]: CloudObject::reset
#[derive(Debug, Clone, PartialEq)]
pub struct CloudObject {
    class_name: ClassName,
    object_id: Option<ObjectId>,
    created_at: Option<CloudDate>,
    updated_at: Option<CloudDate>,
    fields: FieldMap,
    dirty: BTreeSet<String>,
    synced_types: BTreeMap<String, TypeTag>,
    hydrated: bool,
}

impl CloudObject {
    /// Creates a new, unsaved object.
    pub fn create(class_name: &str) -> CoreResult<Self> {
        Ok(Self::new(ClassName::new(class_name)?))
    }

    /// Creates a new, unsaved object of an already validated class.
    #[must_use]
    pub fn new(class_name: ClassName) -> Self {
        Self {
            class_name,
            object_id: None,
            created_at: None,
            updated_at: None,
            fields: FieldMap::new(),
            dirty: BTreeSet::new(),
            synced_types: BTreeMap::new(),
            hydrated: false,
        }
    }

    /// Creates an unsynchronized placeholder for an existing row.
    ///
    /// No I/O happens; refresh, find or save populate it later.
    #[must_use]
    pub fn existing(class_name: ClassName, object_id: ObjectId) -> Self {
        Self {
            object_id: Some(object_id),
            ..Self::new(class_name)
        }
    }

    /// Parses both identifiers and creates a placeholder.
    pub fn existing_from_str(class_name: &str, object_id: &str) -> CoreResult<Self> {
        Ok(Self::existing(
            ClassName::new(class_name)?,
            ObjectId::parse(object_id)?,
        ))
    }

    /// Class of this object.
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Server-assigned id, `None` until the first successful save.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.object_id
    }

    /// Creation timestamp, known once saved or refreshed.
    pub fn created_at(&self) -> Option<CloudDate> {
        self.created_at
    }

    /// Last update timestamp, known once saved or refreshed.
    pub fn updated_at(&self) -> Option<CloudDate> {
        self.updated_at
    }

    /// True if the object has never been durably created.
    pub fn is_new(&self) -> bool {
        self.object_id.is_none()
    }

    /// True once a save, refresh or query has synced the object with its
    /// row. A placeholder stays unhydrated until then.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Case-insensitive lookup of a user field.
    ///
    /// `None` means absent, which is distinct from `Some(&Value::Null)`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(&key.to_ascii_lowercase())
    }

    /// Type of the value under `key`, system fields included.
    ///
    /// Absent keys report [`TypeTag::Null`].
    pub fn type_of(&self, key: &str) -> TypeTag {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            OBJECT_ID_KEY if self.object_id.is_some() => TypeTag::Uuid,
            CREATED_AT_KEY if self.created_at.is_some() => TypeTag::Date,
            UPDATED_AT_KEY if self.updated_at.is_some() => TypeTag::Date,
            _ => self.fields.get(&key).map_or(TypeTag::Null, Value::type_tag),
        }
    }

    /// Sets a field.
    ///
    /// Fails without mutating anything if the key is malformed or reserved,
    /// if the value cannot be written, or if the field was last synced with
    /// a different type. `Null` is compatible with every type.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> CoreResult<()> {
        let key = writable_key(key)?;
        let value = value.into();
        value.validate()?;
        self.check_type(&key, &value)?;
        self.fields.insert(key.clone(), value);
        self.dirty.insert(key);
        Ok(())
    }

    /// Sets a UUID field from its canonical text form.
    pub fn set_uuid(&mut self, key: &str, uuid: &str) -> CoreResult<()> {
        let uuid = parse_uuid(uuid)?;
        self.set(key, Value::Uuid(uuid))
    }

    /// Removes a field. The removal itself is a pending change: the next
    /// save clears the column in the backend.
    pub fn unset(&mut self, key: &str) -> CoreResult<()> {
        let key = writable_key(key)?;
        self.fields.remove(&key);
        self.synced_types.remove(&key);
        self.dirty.insert(key);
        Ok(())
    }

    /// Flags a field changed in place through `array_mut`, `set_mut` or
    /// `map_mut`.
    pub fn mark_dirty(&mut self, key: &str) -> CoreResult<()> {
        let key = writable_key(key)?;
        let value = self
            .fields
            .get(&key)
            .ok_or_else(|| CoreError::missing_field(key.clone()))?;
        value.validate()?;
        self.dirty.insert(key);
        Ok(())
    }

    /// Mutable access to an array field. Does not mark the field dirty.
    pub fn array_mut(&mut self, key: &str) -> Option<&mut Vec<Value>> {
        match self.fields.get_mut(&key.to_ascii_lowercase()) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    /// Mutable access to a set field. Does not mark the field dirty.
    pub fn set_mut(&mut self, key: &str) -> Option<&mut ValueSet> {
        match self.fields.get_mut(&key.to_ascii_lowercase()) {
            Some(Value::Set(set)) => Some(set),
            _ => None,
        }
    }

    /// Mutable access to a map field. Does not mark the field dirty.
    pub fn map_mut(&mut self, key: &str) -> Option<&mut BTreeMap<String, Value>> {
        match self.fields.get_mut(&key.to_ascii_lowercase()) {
            Some(Value::Map(map)) => Some(map),
            _ => None,
        }
    }

    /// True if `key` has an unsaved change.
    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.contains(&key.to_ascii_lowercase())
    }

    /// Keys with unsaved changes, in sorted order.
    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// True if anything has not reached the backend yet.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// User keys, sorted.
    pub fn user_keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Present system keys followed by user keys.
    pub fn all_keys(&self) -> Vec<String> {
        self.system_values()
            .into_iter()
            .map(|(key, _)| key.to_string())
            .chain(self.fields.keys().cloned())
            .collect()
    }

    /// Copy of the user fields.
    pub fn to_map_user_keys(&self) -> FieldMap {
        self.fields.clone()
    }

    /// Copy of the user fields plus the present system fields.
    pub fn to_map_all_keys(&self) -> FieldMap {
        let mut map = self.fields.clone();
        for (key, value) in self.system_values() {
            map.insert(key.to_string(), value);
        }
        map
    }

    /// The dirty-set as a delta: present keys are set, absent keys cleared.
    pub fn pending_delta(&self) -> FieldDelta {
        self.dirty
            .iter()
            .map(|key| {
                let change = match self.fields.get(key) {
                    Some(value) => FieldChange::Set(value.clone()),
                    None => FieldChange::Clear,
                };
                (key.clone(), change)
            })
            .collect()
    }

    /// Every field currently held, sent when the object is first created.
    pub fn creation_fields(&self) -> FieldMap {
        self.fields.clone()
    }

    /// Re-validates pending values, which may have been edited in place.
    pub fn validate_pending(&self) -> CoreResult<()> {
        let pending = self.fields.iter().filter(|(key, _)| self.is_new() || self.dirty.contains(*key));
        for (key, value) in pending {
            value.validate()?;
            self.check_type(key, value)?;
        }
        Ok(())
    }

    /// Records a successful creation.
    pub fn apply_created(&mut self, response: &CreateResponse) {
        self.object_id = Some(ObjectId::from_uuid(response.object_id));
        self.created_at = Some(response.created_at);
        self.updated_at = Some(response.updated_at);
        self.synced_types = types_of(&self.fields);
        self.dirty.clear();
        self.hydrated = true;
    }

    /// Records a successful update that pushed `delta`.
    pub fn apply_updated(&mut self, delta: &FieldDelta, updated_at: CloudDate) {
        for (key, change) in delta {
            match change {
                FieldChange::Set(Value::Null) => {}
                FieldChange::Set(value) => {
                    self.synced_types.insert(key.clone(), value.type_tag());
                }
                FieldChange::Clear => {
                    self.synced_types.remove(key);
                }
            }
            self.dirty.remove(key);
        }
        self.updated_at = Some(updated_at);
        self.hydrated = true;
    }

    /// Overwrites the whole object with a row read from the backend,
    /// discarding every local change.
    pub fn apply_record(&mut self, record: ObjectRecord) {
        self.object_id = Some(ObjectId::from_uuid(record.object_id));
        self.created_at = Some(record.created_at);
        self.updated_at = Some(record.updated_at);
        self.synced_types = types_of(&record.fields);
        self.fields = record.fields;
        self.dirty.clear();
        self.hydrated = true;
    }

    /// Resets to a new, empty object of the same class.
    pub fn reset(&mut self) {
        *self = Self::new(self.class_name.clone());
    }

    fn check_type(&self, key: &str, value: &Value) -> CoreResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self.synced_types.get(key) {
            Some(&expected) if expected != value.type_tag() => Err(CoreError::TypeConflict {
                key: key.to_string(),
                expected,
                actual: value.type_tag(),
            }),
            _ => Ok(()),
        }
    }

    fn system_values(&self) -> Vec<(&'static str, Value)> {
        let mut out = Vec::with_capacity(3);
        if let Some(id) = self.object_id {
            out.push((OBJECT_ID_KEY, Value::Uuid(*id.as_uuid())));
        }
        if let Some(created) = self.created_at {
            out.push((CREATED_AT_KEY, Value::Date(created)));
        }
        if let Some(updated) = self.updated_at {
            out.push((UPDATED_AT_KEY, Value::Date(updated)));
        }
        out
    }
}

fn types_of(fields: &FieldMap) -> BTreeMap<String, TypeTag> {
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.type_tag()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_codec::{generate_uuid, CodecError};

    fn synced(fields: &[(&str, Value)]) -> CloudObject {
        let mut object = CloudObject::create("game").unwrap();
        let now = CloudDate::now();
        object.apply_record(ObjectRecord {
            class_name: "game".into(),
            object_id: generate_uuid(),
            created_at: now,
            updated_at: now,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        object
    }

    #[test]
    fn create_validates_class_name() {
        let object = CloudObject::create("GameScore").unwrap();
        assert_eq!(object.class_name().as_str(), "gamescore");
        assert!(object.is_new());
        assert!(!object.has_unsaved_changes());

        assert!(matches!(
            CloudObject::create("2fast"),
            Err(CoreError::InvalidIdentifier { .. })
        ));
        assert!(CloudObject::create("table__").is_err());
    }

    #[test]
    fn set_then_get_before_sync() {
        let mut object = CloudObject::create("game").unwrap();
        object.set("Score", 42).unwrap();
        object.set("name", "").unwrap();

        assert_eq!(object.get("score"), Some(&Value::Int32(42)));
        assert_eq!(object.get("SCORE"), Some(&Value::Int32(42)));
        assert_eq!(object.get("name"), Some(&Value::from("")));
        assert_eq!(object.get("missing"), None);
        assert!(object.is_dirty("score"));
        assert_eq!(object.dirty_keys().collect::<Vec<_>>(), vec!["name", "score"]);
    }

    #[test]
    fn set_rejects_bad_keys_without_mutation() {
        let mut object = CloudObject::create("game").unwrap();
        assert!(matches!(
            object.set("objectId", 1),
            Err(CoreError::ReservedField { .. })
        ));
        assert!(matches!(
            object.set("bad key", 1),
            Err(CoreError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            object.set("x", Value::Unsupported),
            Err(CoreError::Codec(CodecError::UnsupportedValue))
        ));
        assert!(object.set("x", f64::NAN).is_err());
        assert!(object.user_keys().is_empty());
        assert!(!object.has_unsaved_changes());
    }

    #[test]
    fn local_fields_change_type_freely() {
        let mut object = CloudObject::create("game").unwrap();
        object.set("score", 1).unwrap();
        object.set("score", "one").unwrap();
        assert_eq!(object.type_of("score"), TypeTag::String);
    }

    #[test]
    fn synced_type_conflict_leaves_state_unchanged() {
        let mut object = synced(&[("score", Value::Int32(1))]);
        let before = object.clone();

        let err = object.set("score", "one").unwrap_err();
        assert_eq!(
            err,
            CoreError::TypeConflict {
                key: "score".into(),
                expected: TypeTag::Int32,
                actual: TypeTag::String,
            }
        );
        assert_eq!(object, before);

        object.set("score", 2).unwrap();
        object.set("score", Value::Null).unwrap();
        assert!(object.is_dirty("score"));
    }

    #[test]
    fn unset_is_a_pending_clear() {
        let mut object = synced(&[("score", Value::Int32(1)), ("name", Value::from("a"))]);
        object.unset("score").unwrap();

        assert_eq!(object.get("score"), None);
        assert!(object.is_dirty("score"));
        let delta = object.pending_delta();
        assert_eq!(delta.get("score"), Some(&FieldChange::Clear));
        assert!(!delta.contains_key("name"));

        object.set("score", "now a string").unwrap();
        assert_eq!(
            object.pending_delta().get("score"),
            Some(&FieldChange::Set(Value::from("now a string")))
        );
    }

    #[test]
    fn in_place_edits_need_mark_dirty() {
        let mut object = synced(&[("tags", Value::from(vec!["a"]))]);
        object.array_mut("tags").unwrap().push(Value::from("b"));
        assert!(!object.is_dirty("tags"));

        object.mark_dirty("tags").unwrap();
        assert!(object.is_dirty("tags"));
        assert_eq!(
            object.get("tags"),
            Some(&Value::from(vec!["a", "b"]))
        );

        assert!(matches!(
            object.mark_dirty("nothing"),
            Err(CoreError::MissingField { .. })
        ));
        assert!(object.set_mut("tags").is_none());
        assert!(object.map_mut("tags").is_none());
    }

    #[test]
    fn set_uuid_checks_layout() {
        let mut object = CloudObject::create("game").unwrap();
        object
            .set_uuid("owner", "BE5BA3D0-971C-4418-9ECF-E2D1ABCB66BE")
            .unwrap();
        assert_eq!(object.type_of("owner"), TypeTag::Uuid);
        assert!(object.set_uuid("other", "be5ba3d0971c44189ecfe2d1abcb66be").is_err());
        assert!(object.get("other").is_none());
    }

    #[test]
    fn creation_clears_dirty_and_records_types() {
        let mut object = CloudObject::create("game").unwrap();
        object.set("a", true).unwrap();
        object.set("b", "x").unwrap();

        let now = CloudDate::now();
        let id = generate_uuid();
        object.apply_created(&CreateResponse {
            object_id: id,
            created_at: now,
            updated_at: now,
        });

        assert_eq!(object.object_id().map(|o| *o.as_uuid()), Some(id));
        assert!(!object.has_unsaved_changes());
        assert!(object.set("a", 1).unwrap_err().is_type_conflict());
    }

    #[test]
    fn update_clears_only_pushed_keys() {
        let mut object = synced(&[("a", Value::Int32(1))]);
        object.set("a", 2).unwrap();
        let delta = object.pending_delta();
        object.set("b", true).unwrap();

        let later = CloudDate::from_millis(CloudDate::now().to_millis() + 1000).unwrap();
        object.apply_updated(&delta, later);
        assert!(!object.is_dirty("a"));
        assert!(object.is_dirty("b"));
        assert_eq!(object.updated_at(), Some(later));
    }

    #[test]
    fn system_keys_and_maps() {
        let object = synced(&[("score", Value::Int32(1))]);
        assert_eq!(object.type_of("objectId"), TypeTag::Uuid);
        assert_eq!(object.type_of("updatedat"), TypeTag::Date);
        assert_eq!(object.type_of("nothing"), TypeTag::Null);
        assert_eq!(
            object.all_keys(),
            vec!["objectid", "createdat", "updatedat", "score"]
        );
        assert_eq!(object.user_keys(), vec!["score"]);
        assert_eq!(object.to_map_all_keys().len(), 4);
        assert_eq!(object.to_map_user_keys().len(), 1);

        let fresh = CloudObject::create("game").unwrap();
        assert_eq!(fresh.type_of("objectid"), TypeTag::Null);
        assert!(fresh.all_keys().is_empty());
    }

    #[test]
    fn reset_keeps_only_class() {
        let mut object = synced(&[("score", Value::Int32(1))]);
        object.set("x", 1).unwrap();
        object.reset();
        assert_eq!(object, CloudObject::create("game").unwrap());
    }

    #[test]
    fn placeholder_is_not_hydrated() {
        let object = CloudObject::existing_from_str("game", "550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!object.is_new());
        assert!(!object.is_hydrated());
        assert!(object.user_keys().is_empty());
        assert!(CloudObject::existing_from_str("game", "550e8400").is_err());
    }

    #[test]
    fn saved_placeholder_is_hydrated() {
        let mut object = CloudObject::existing_from_str("game", "550e8400-e29b-41d4-a716-446655440000").unwrap();
        object.set("score", 2).unwrap();
        let delta = object.pending_delta();
        object.apply_updated(&delta, CloudDate::now());
        assert!(object.is_hydrated());
        assert!(!object.has_unsaved_changes());
    }
}
