//! Property-based test generators using proptest.
//!
//! Provides strategies for identifiers, dates and field values, valid
//! and invalid.

use cirrus_codec::{is_system_field, CloudDate, GeoPoint, Uuid, Value, ValueSet};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for identifiers accepted by the grammar.
pub fn valid_identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}")
        .expect("Invalid regex")
        .prop_filter("Identifier must not end in __", |s| !s.ends_with("__"))
}

/// Strategy for identifiers rejected by the grammar: reserved `__`
/// suffixes, leading digits or underscores, stray punctuation, and the
/// empty string.
pub fn invalid_identifier_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,20}__").expect("Invalid regex"),
        prop::string::string_regex("[0-9_][a-zA-Z0-9_]{0,20}").expect("Invalid regex"),
        prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,10}[- .$][a-zA-Z0-9_]{0,10}")
            .expect("Invalid regex"),
        Just(String::new()),
    ]
}

/// Strategy for user field keys, already lowercase and never a system key.
pub fn field_key_strategy() -> impl Strategy<Value = String> {
    valid_identifier_strategy()
        .prop_map(|s| s.to_ascii_lowercase())
        .prop_filter("Key must not be a system field", |s| !is_system_field(s))
}

/// Strategy for strings in the date wire format, `yyyy-MM-dd HH:mm:ss.SSS ±HH:MM`.
pub fn date_string_strategy() -> impl Strategy<Value = String> {
    (
        1970i32..=2999,
        1u8..=12,
        1u8..=28,
        0u8..24,
        0u8..60,
        0u8..60,
        0u16..1000,
        -12i8..=14,
        prop::sample::select(vec![0u8, 30, 45]),
    )
        .prop_map(|(year, month, day, hour, minute, second, millis, offset_hour, offset_minute)| {
            let sign = if offset_hour < 0 { '-' } else { '+' };
            format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{millis:03} {sign}{:02}:{offset_minute:02}",
                offset_hour.unsigned_abs()
            )
        })
}

/// Strategy for milliseconds since the epoch, 1900 to 2100.
pub fn millis_strategy() -> impl Strategy<Value = i64> {
    -2_208_988_800_000i64..4_102_444_800_000
}

/// Strategy for valid geo points.
pub fn geo_point_strategy() -> impl Strategy<Value = GeoPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0)
        .prop_map(|(lat, lng)| GeoPoint::new(lat, lng).expect("coordinates in range"))
}

/// Strategy for scalar values a client can store.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        (-1.0e6f32..1.0e6).prop_map(Value::Float),
        (-1.0e12f64..1.0e12).prop_map(Value::Double),
        ".{0,16}".prop_map(Value::String),
        any::<u128>().prop_map(|n| Value::Uuid(Uuid::from_u128(n))),
        millis_strategy().prop_map(|ms| Value::Date(
            CloudDate::from_millis(ms).expect("millis in range")
        )),
        geo_point_strategy().prop_map(Value::GeoPoint),
    ]
}

/// Strategy for any storable value, compound values nested a few levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| Value::Set(items.into_iter().collect::<ValueSet>())),
            prop::collection::btree_map(field_key_strategy(), inner, 0..4)
                .prop_map(|map: BTreeMap<String, Value>| Value::Map(map)),
        ]
    })
}

/// Strategy for a small set of fields to put on an object.
pub fn fields_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(field_key_strategy(), value_strategy(), 0..6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_codec::is_valid_identifier;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generators_produce_their_class() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let good = valid_identifier_strategy().new_tree(&mut runner).unwrap().current();
            assert!(is_valid_identifier(&good), "{good}");
            let bad = invalid_identifier_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!is_valid_identifier(&bad), "{bad}");
        }
    }

    #[test]
    fn generated_dates_parse() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let s = date_string_strategy().new_tree(&mut runner).unwrap().current();
            assert!(CloudDate::parse(&s).is_ok(), "{s}");
        }
    }

    #[test]
    fn generated_values_validate() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let value = value_strategy().new_tree(&mut runner).unwrap().current();
            assert!(value.validate().is_ok(), "{value:?}");
        }
    }
}
