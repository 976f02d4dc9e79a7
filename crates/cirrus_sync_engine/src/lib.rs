//! # Cirrus Sync Engine
//!
//! Round trips between Cirrus objects and the remote store.
//!
//! This crate provides:
//! - `SyncEngine`: save, refresh, delete, find, count, modify and delete by query
//! - Blocking and async (`spawn_blocking`) forms of every I/O operation
//! - `RemoteStore` abstraction over the backend
//! - `MemoryStore`: a complete in-process backend
//! - HTTP transport with a pluggable `HttpClient`
//! - `ClientConfig`: credentials and service settings
//!
//! ## Architecture
//!
//! Objects and queries are built locally with `cirrus_core`. The engine
//! validates them, sends one request per operation to its `RemoteStore`,
//! and applies the answer to the object only after the request succeeded.
//!
//! ## Key Invariants
//!
//! - Local validation failures never reach the store
//! - A failed operation leaves the object unchanged
//! - Only the dirty-set of a saved object is sent
//! - Bulk modifies either change every matched row or none
//! - Nothing is retried internally

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod memory;
mod transport;

pub use config::ClientConfig;
pub use engine::{RefreshOutcome, SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use memory::MemoryStore;
pub use transport::RemoteStore;
