//! # Cirrus Codec
//!
//! Typed field values for Cirrus and their JSON wire encoding.
//!
//! This crate provides:
//! - [`Value`], a closed sum over every type a field can hold
//! - [`CloudDate`] and [`GeoPoint`] with their validation rules
//! - The identifier and UUID grammar shared by class names and field keys
//! - A tagged JSON wire form (`{"t": <type>, "v": <payload>}`)
//!
//! ## Usage
//!
//! ```
//! use cirrus_codec::{Value, TypeTag, from_json_bytes, to_json_bytes};
//!
//! let value = Value::from(vec![1, 2, 3]);
//! assert_eq!(value.type_tag(), TypeTag::Array);
//!
//! let bytes = to_json_bytes(&value).unwrap();
//! let decoded: Value = from_json_bytes(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod date;
mod error;
mod geo;
mod ident;
mod value;
mod wire;

pub use date::CloudDate;
pub use error::{CodecError, CodecResult};
pub use geo::{GeoPoint, EARTH_RADIUS_METERS};
pub use ident::{
    generate_uuid, is_system_field, is_valid_identifier, is_valid_uuid, normalize_identifier,
    parse_uuid, uuid_to_string, CREATED_AT_KEY, OBJECT_ID_KEY, SYSTEM_FIELDS, UPDATED_AT_KEY,
};
pub use value::{TypeTag, Value, ValueSet};
pub use wire::{from_json_bytes, to_json_bytes};

pub use uuid::Uuid;

/// Trait for types that can be encoded to wire bytes.
pub trait Encode {
    /// Encode this value to JSON bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from wire bytes.
pub trait Decode: Sized {
    /// Decode this value from JSON bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: serde::Serialize> Encode for T {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_json_bytes(self)
    }
}

impl<T: serde::de::DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_json_bytes(bytes)
    }
}
