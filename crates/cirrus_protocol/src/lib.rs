//! # Cirrus Protocol
//!
//! Wire contract between the Cirrus client and a remote object store.
//!
//! This crate provides:
//! - `QueryDescriptor`, the compiled, backend-agnostic form of a query
//! - Field deltas (`FieldChange::Set` / `FieldChange::Clear`) and stored records
//! - Request/response messages, credential envelopes and failure replies
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod query;
mod record;

pub use messages::{
    Ack, CountResponse, CreateRequest, CreateResponse, DeleteRequest, Endpoint, FailureKind,
    FetchRequest, FindResponse, ModifyRequest, Reply, RequestEnvelope, ServerFailure,
    UpdateRequest, UpdateResponse,
};
pub use query::{CompareOp, Constraint, Predicate, QueryDescriptor, SortKey, TextOp};
pub use record::{FieldChange, FieldDelta, FieldMap, ObjectRecord};
