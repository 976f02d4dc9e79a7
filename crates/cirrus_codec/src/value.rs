//! Typed field values.

use crate::date::CloudDate;
use crate::error::{CodecError, CodecResult};
use crate::geo::GeoPoint;
use crate::ident::parse_uuid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Discriminant of a [`Value`], also used as a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// UUID.
    Uuid,
    /// Date.
    Date,
    /// Geographic point.
    GeoPoint,
    /// Ordered list.
    Array,
    /// Unordered collection of unique values.
    Set,
    /// String-keyed map.
    Map,
    /// Null.
    Null,
    /// Value the client cannot represent.
    Unsupported,
}

impl TypeTag {
    /// Returns true for the four numeric types.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeTag::Int32 | TypeTag::Int64 | TypeTag::Float | TypeTag::Double
        )
    }

    /// Returns true for array, set and map.
    pub fn is_compound(self) -> bool {
        matches!(self, TypeTag::Array | TypeTag::Set | TypeTag::Map)
    }

    /// Stable lowercase name, identical to the wire spelling.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int32 => "int32",
            TypeTag::Int64 => "int64",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Uuid => "uuid",
            TypeTag::Date => "date",
            TypeTag::GeoPoint => "geo_point",
            TypeTag::Array => "array",
            TypeTag::Set => "set",
            TypeTag::Map => "map",
            TypeTag::Null => "null",
            TypeTag::Unsupported => "unsupported",
        }
    }
}

impl TypeTag {
    /// Looks up a tag by its wire name. Unknown names map to `Unsupported`.
    pub fn from_name(name: &str) -> TypeTag {
        match name {
            "bool" => TypeTag::Bool,
            "int32" => TypeTag::Int32,
            "int64" => TypeTag::Int64,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            "string" => TypeTag::String,
            "uuid" => TypeTag::Uuid,
            "date" => TypeTag::Date,
            "geo_point" => TypeTag::GeoPoint,
            "array" => TypeTag::Array,
            "set" => TypeTag::Set,
            "map" => TypeTag::Map,
            "null" => TypeTag::Null,
            _ => TypeTag::Unsupported,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field value.
///
/// Every read, write and encode site matches on this enum exhaustively.
/// `Unsupported` only appears when decoding foreign data; [`Value::validate`]
/// rejects it, so it can never be written back.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Text string. The empty string is a valid value distinct from `Null`.
    String(String),
    /// UUID, rendered in canonical lowercase hyphenated form.
    Uuid(Uuid),
    /// Millisecond-precision instant.
    Date(CloudDate),
    /// Geographic point.
    GeoPoint(GeoPoint),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Unordered collection of unique values.
    Set(ValueSet),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
    /// Sentinel for values the backend stores but the client cannot represent.
    Unsupported,
}

impl Value {
    /// Returns the discriminant of this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int32(_) => TypeTag::Int32,
            Value::Int64(_) => TypeTag::Int64,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::String(_) => TypeTag::String,
            Value::Uuid(_) => TypeTag::Uuid,
            Value::Date(_) => TypeTag::Date,
            Value::GeoPoint(_) => TypeTag::GeoPoint,
            Value::Array(_) => TypeTag::Array,
            Value::Set(_) => TypeTag::Set,
            Value::Map(_) => TypeTag::Map,
            Value::Unsupported => TypeTag::Unsupported,
        }
    }

    /// Returns true if both values have the same discriminant.
    pub fn same_type(&self, other: &Value) -> bool {
        self.type_tag() == other.type_tag()
    }

    /// Parses a canonical UUID string into a `Value::Uuid`.
    pub fn uuid(input: &str) -> CodecResult<Self> {
        parse_uuid(input).map(Value::Uuid)
    }

    /// Parses a date in the fixed wire format into a `Value::Date`.
    pub fn date(input: &str) -> CodecResult<Self> {
        CloudDate::parse(input).map(Value::Date)
    }

    /// Creates a validated `Value::GeoPoint`.
    pub fn geo_point(latitude: f64, longitude: f64) -> CodecResult<Self> {
        GeoPoint::new(latitude, longitude).map(Value::GeoPoint)
    }

    /// Checks that this value may be written to the backend.
    ///
    /// Rejects the `Unsupported` sentinel and non-finite floats, recursing
    /// into compound values. Geo points are validated at construction.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Value::Null
            | Value::Bool(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::String(_)
            | Value::Uuid(_)
            | Value::Date(_)
            | Value::GeoPoint(_) => Ok(()),
            Value::Float(f) if !f.is_finite() => Err(CodecError::NonFiniteFloat),
            Value::Double(d) if !d.is_finite() => Err(CodecError::NonFiniteFloat),
            Value::Float(_) | Value::Double(_) => Ok(()),
            Value::Array(items) => items.iter().try_for_each(Value::validate),
            Value::Set(set) => set.iter().try_for_each(Value::validate),
            Value::Map(map) => map.values().try_for_each(Value::validate),
            Value::Unsupported => Err(CodecError::UnsupportedValue),
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an `i64`, widening `Int32`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as an `f64`, widening any numeric type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a UUID, if it is one.
    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Get this value as a date, if it is one.
    pub fn as_date(&self) -> Option<&CloudDate> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Get this value as a geo point, if it is one.
    pub fn as_geo_point(&self) -> Option<&GeoPoint> {
        match self {
            Value::GeoPoint(p) => Some(p),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a set, if it is one.
    pub fn as_set(&self) -> Option<&ValueSet> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Compares two values of the same type family.
    ///
    /// Numbers compare across widths, strings lexicographically, dates by
    /// instant, UUIDs by canonical text, `false < true`. Returns `None` for
    /// values that have no order between them (different families,
    /// compound values, geo points, nulls, NaN).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) if a.type_tag().is_numeric() && b.type_tag().is_numeric() => {
                match (a.as_i64(), b.as_i64()) {
                    (Some(x), Some(y)) => Some(x.cmp(&y)),
                    _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
                }
            }
            _ => None,
        }
    }

    /// Equality used by query evaluation: numeric values are equal when
    /// they compare equal across widths, everything else uses `==`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self.type_tag().is_numeric() && other.type_tag().is_numeric() {
            return self.compare(other) == Some(Ordering::Equal);
        }
        self == other
    }
}

/// An unordered collection of unique values.
///
/// Uniqueness uses value equality. Iteration order is insertion order but
/// carries no meaning: two sets with the same members are equal.
#[derive(Debug, Clone, Default)]
pub struct ValueSet(Vec<Value>);

impl ValueSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts a value. Returns false if an equal value was already present.
    pub fn insert(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.0.push(value);
        true
    }

    /// Removes a value. Returns true if it was present.
    pub fn remove(&mut self, value: &Value) -> bool {
        match self.0.iter().position(|v| v == value) {
            Some(i) => {
                self.0.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Returns true if the set contains a value equal to `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.0.iter().any(|v| v == value)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the members.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

impl FromIterator<Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = ValueSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl IntoIterator for ValueSet {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<CloudDate> for Value {
    fn from(d: CloudDate) -> Self {
        Value::Date(d)
    }
}

impl From<GeoPoint> for Value {
    fn from(p: GeoPoint) -> Self {
        Value::GeoPoint(p)
    }
}

impl From<ValueSet> for Value {
    fn from(s: ValueSet) -> Self {
        Value::Set(s)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
