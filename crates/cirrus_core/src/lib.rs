//! # Cirrus Core
//!
//! Object model for the Cirrus cloud SDK.
//!
//! This crate provides:
//! - `CloudObject`: a schema-flexible row with a dirty-set of unsaved changes
//! - `FileRecord`: file metadata composed over a `CloudObject`
//! - `LocalCache`: identity map from (class, object id) to one shared instance
//! - `QueryBuilder`: fluent constraints compiled into a `QueryDescriptor`
//!
//! Everything here is local. Round trips to the backend live in
//! `cirrus_sync_engine`, which drives the `apply_*` hooks of `CloudObject`
//! after each successful response.
//!
//! ## Key Invariants
//!
//! - Class names and field keys are normalized to lowercase
//! - System fields (`objectid`, `createdat`, `updatedat`) are never settable
//! - A field synced with one type rejects values of another until cleared
//! - Failed operations leave objects unchanged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod object;
mod query;
mod types;

pub use cache::{LocalCache, SharedObject};
pub use error::{CoreError, CoreResult};
pub use object::{CloudObject, FileRecord, FileStatus};
pub use query::{QueryBuilder, DEFAULT_LIMIT, MAX_SORT_KEYS};
pub use types::{normalize_key, writable_key, ClassName, ObjectId, FILE_CLASS};

pub use cirrus_codec::{CloudDate, GeoPoint, TypeTag, Value, ValueSet};
pub use cirrus_protocol::{CompareOp, QueryDescriptor, TextOp};
