//! JSON wire representation of values.
//!
//! A value on the wire is a tagged pair `{"t": <type>, "v": <payload>}`.
//! Payloads are plain JSON: numbers as numbers, dates in the fixed
//! millisecond format, UUIDs in lowercase hyphenated form, geo points as
//! `{"lat", "lng"}`. Members of arrays, sets and maps are themselves tagged
//! so heterogeneous collections keep their element types.

use crate::date::CloudDate;
use crate::error::{CodecError, CodecResult};
use crate::geo::GeoPoint;
use crate::ident::{parse_uuid, uuid_to_string};
use crate::value::{TypeTag, Value, ValueSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value as Json};
use std::collections::BTreeMap;

const TAG_KEY: &str = "t";
const PAYLOAD_KEY: &str = "v";

impl Value {
    /// Encodes the payload of this value, without its type tag.
    pub fn to_wire(&self) -> CodecResult<Json> {
        let json = match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int32(n) => json!(n),
            Value::Int64(n) => json!(n),
            Value::Float(f) => finite_number(f64::from(*f))?,
            Value::Double(d) => finite_number(*d)?,
            Value::String(s) => Json::String(s.clone()),
            Value::Uuid(u) => Json::String(uuid_to_string(u)),
            Value::Date(d) => Json::String(d.to_string()),
            Value::GeoPoint(p) => json!({ "lat": p.latitude(), "lng": p.longitude() }),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_tagged)
                    .collect::<CodecResult<_>>()?,
            ),
            Value::Set(set) => Json::Array(
                set.iter()
                    .map(Value::to_tagged)
                    .collect::<CodecResult<_>>()?,
            ),
            Value::Map(map) => {
                let mut out = JsonMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_tagged()?);
                }
                Json::Object(out)
            }
            Value::Unsupported => return Err(CodecError::UnsupportedValue),
        };
        Ok(json)
    }

    /// Decodes a payload declared to be of type `tag`.
    ///
    /// An `Unsupported` tag (including any tag this client does not know)
    /// yields [`Value::Unsupported`] whatever the payload.
    pub fn from_wire(tag: TypeTag, json: &Json) -> CodecResult<Value> {
        let mismatch = |what: &str| CodecError::wire_mismatch(tag, format!("expected {what}, got {json}"));
        let value = match tag {
            TypeTag::Null => match json {
                Json::Null => Value::Null,
                _ => return Err(mismatch("null")),
            },
            TypeTag::Bool => Value::Bool(json.as_bool().ok_or_else(|| mismatch("boolean"))?),
            TypeTag::Int32 => {
                let n = json.as_i64().ok_or_else(|| mismatch("integer"))?;
                Value::Int32(i32::try_from(n).map_err(|_| mismatch("32-bit integer"))?)
            }
            TypeTag::Int64 => Value::Int64(json.as_i64().ok_or_else(|| mismatch("integer"))?),
            TypeTag::Float => Value::Float(json.as_f64().ok_or_else(|| mismatch("number"))? as f32),
            TypeTag::Double => Value::Double(json.as_f64().ok_or_else(|| mismatch("number"))?),
            TypeTag::String => Value::String(json.as_str().ok_or_else(|| mismatch("string"))?.to_string()),
            TypeTag::Uuid => Value::Uuid(parse_uuid(json.as_str().ok_or_else(|| mismatch("string"))?)?),
            TypeTag::Date => Value::Date(CloudDate::parse(json.as_str().ok_or_else(|| mismatch("string"))?)?),
            TypeTag::GeoPoint => {
                let lat = json.get("lat").and_then(Json::as_f64);
                let lng = json.get("lng").and_then(Json::as_f64);
                match (lat, lng) {
                    (Some(lat), Some(lng)) => Value::GeoPoint(GeoPoint::new(lat, lng)?),
                    _ => return Err(mismatch("{lat, lng} object")),
                }
            }
            TypeTag::Array => Value::Array(
                json.as_array()
                    .ok_or_else(|| mismatch("array"))?
                    .iter()
                    .map(Value::from_tagged)
                    .collect::<CodecResult<_>>()?,
            ),
            TypeTag::Set => {
                let items = json.as_array().ok_or_else(|| mismatch("array"))?;
                let mut set = ValueSet::new();
                for item in items {
                    set.insert(Value::from_tagged(item)?);
                }
                Value::Set(set)
            }
            TypeTag::Map => {
                let object = json.as_object().ok_or_else(|| mismatch("object"))?;
                let mut map = BTreeMap::new();
                for (key, item) in object {
                    map.insert(key.clone(), Value::from_tagged(item)?);
                }
                Value::Map(map)
            }
            TypeTag::Unsupported => Value::Unsupported,
        };
        value.validate_read()?;
        Ok(value)
    }

    /// Encodes this value as a tagged pair.
    pub fn to_tagged(&self) -> CodecResult<Json> {
        Ok(json!({
            TAG_KEY: self.type_tag(),
            PAYLOAD_KEY: self.to_wire()?,
        }))
    }

    /// Decodes a tagged pair.
    pub fn from_tagged(json: &Json) -> CodecResult<Value> {
        let object = json
            .as_object()
            .ok_or_else(|| CodecError::decoding_failed(format!("expected tagged value, got {json}")))?;
        let tag = object
            .get(TAG_KEY)
            .ok_or_else(|| CodecError::decoding_failed("tagged value has no type"))?;
        let tag = tag
            .as_str()
            .map(TypeTag::from_name)
            .ok_or_else(|| CodecError::decoding_failed(format!("type tag is not a string: {tag}")))?;
        let payload = object.get(PAYLOAD_KEY).unwrap_or(&Json::Null);
        Value::from_wire(tag, payload)
    }

    // Floats read from the wire must be finite; Unsupported is allowed on read.
    fn validate_read(&self) -> CodecResult<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(CodecError::NonFiniteFloat),
            Value::Double(d) if !d.is_finite() => Err(CodecError::NonFiniteFloat),
            _ => Ok(()),
        }
    }
}

fn finite_number(n: f64) -> CodecResult<Json> {
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .ok_or(CodecError::NonFiniteFloat)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_tagged()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Value::from_tagged(&json).map_err(serde::de::Error::custom)
    }
}

/// Serializes any serde type to JSON bytes.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Deserializes any serde type from JSON bytes.
pub fn from_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
