//! Field deltas and stored object records.

use cirrus_codec::{CloudDate, Uuid, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pending change to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    /// Store this value.
    Set(Value),
    /// Remove the column from the row.
    Clear,
}

/// Changes keyed by normalized field name.
pub type FieldDelta = BTreeMap<String, FieldChange>;

/// Fields keyed by normalized field name.
pub type FieldMap = BTreeMap<String, Value>;

/// A row as stored by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Normalized class name.
    pub class_name: String,
    /// Server-assigned id.
    pub object_id: Uuid,
    /// Creation timestamp.
    pub created_at: CloudDate,
    /// Last update timestamp.
    pub updated_at: CloudDate,
    /// User fields, without system fields.
    pub fields: FieldMap,
}

impl ObjectRecord {
    /// Applies a delta in place.
    pub fn apply(&mut self, delta: &FieldDelta) {
        for (key, change) in delta {
            match change {
                FieldChange::Set(value) => {
                    self.fields.insert(key.clone(), value.clone());
                }
                FieldChange::Clear => {
                    self.fields.remove(key);
                }
            }
        }
    }

    /// Keeps only the listed fields. An empty list keeps everything.
    pub fn project(mut self, keys: &[String]) -> Self {
        if !keys.is_empty() {
            self.fields.retain(|key, _| keys.contains(key));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_codec::generate_uuid;

    fn record() -> ObjectRecord {
        let now = CloudDate::now();
        let mut fields = FieldMap::new();
        fields.insert("a".into(), Value::Bool(true));
        fields.insert("b".into(), Value::from("x"));
        ObjectRecord {
            class_name: "game".into(),
            object_id: generate_uuid(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    #[test]
    fn apply_sets_and_clears() {
        let mut rec = record();
        let mut delta = FieldDelta::new();
        delta.insert("a".into(), FieldChange::Clear);
        delta.insert("c".into(), FieldChange::Set(Value::Int32(3)));
        rec.apply(&delta);

        assert!(!rec.fields.contains_key("a"));
        assert_eq!(rec.fields.get("b"), Some(&Value::from("x")));
        assert_eq!(rec.fields.get("c"), Some(&Value::Int32(3)));
    }

    #[test]
    fn projection() {
        let rec = record().project(&["b".to_string(), "zzz".to_string()]);
        assert_eq!(rec.fields.len(), 1);
        assert!(rec.fields.contains_key("b"));

        assert_eq!(record().project(&[]).fields.len(), 2);
    }

    #[test]
    fn change_serde_shape() {
        let set = serde_json::to_value(FieldChange::Set(Value::Int32(1))).unwrap();
        assert_eq!(set, serde_json::json!({"op": "set", "value": {"t": "int32", "v": 1}}));
        let clear = serde_json::to_value(FieldChange::Clear).unwrap();
        assert_eq!(clear, serde_json::json!({"op": "clear"}));
        assert_eq!(serde_json::from_value::<FieldChange>(clear).unwrap(), FieldChange::Clear);
    }
}
