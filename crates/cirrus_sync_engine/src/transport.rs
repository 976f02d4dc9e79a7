//! Remote store abstraction.

use crate::error::SyncResult;
use cirrus_protocol::{
    CreateRequest, CreateResponse, DeleteRequest, FetchRequest, ModifyRequest, ObjectRecord,
    QueryDescriptor, UpdateRequest, UpdateResponse,
};
use std::sync::Arc;

/// The backend holding every class and row.
///
/// This trait abstracts where requests go, allowing an HTTP service, an
/// in-process store for tests, or anything else. Implementations never
/// retry; a failed call is reported once.
pub trait RemoteStore: Send + Sync {
    /// Inserts a row and assigns its id and timestamps.
    fn create(&self, request: &CreateRequest) -> SyncResult<CreateResponse>;

    /// Reads a full row. Fails with `NotFound` if it does not exist.
    fn fetch(&self, request: &FetchRequest) -> SyncResult<ObjectRecord>;

    /// Applies a delta to a row. Type mismatches reject the whole delta.
    fn update(&self, request: &UpdateRequest) -> SyncResult<UpdateResponse>;

    /// Deletes a row.
    fn delete(&self, request: &DeleteRequest) -> SyncResult<()>;

    /// Runs a query.
    fn find(&self, query: &QueryDescriptor) -> SyncResult<Vec<ObjectRecord>>;

    /// Counts the rows a query matches, ignoring limit and skip.
    fn count(&self, query: &QueryDescriptor) -> SyncResult<u64>;

    /// Applies a delta to every row a query matches, ignoring limit and
    /// skip. Either every row is updated or none is.
    fn modify(&self, request: &ModifyRequest) -> SyncResult<u64>;

    /// Deletes every row a query matches, ignoring limit and skip.
    fn delete_matching(&self, query: &QueryDescriptor) -> SyncResult<u64>;

    /// Checks if the store is reachable.
    fn is_available(&self) -> bool;
}

impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    fn create(&self, request: &CreateRequest) -> SyncResult<CreateResponse> {
        (**self).create(request)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<ObjectRecord> {
        (**self).fetch(request)
    }

    fn update(&self, request: &UpdateRequest) -> SyncResult<UpdateResponse> {
        (**self).update(request)
    }

    fn delete(&self, request: &DeleteRequest) -> SyncResult<()> {
        (**self).delete(request)
    }

    fn find(&self, query: &QueryDescriptor) -> SyncResult<Vec<ObjectRecord>> {
        (**self).find(query)
    }

    fn count(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        (**self).count(query)
    }

    fn modify(&self, request: &ModifyRequest) -> SyncResult<u64> {
        (**self).modify(request)
    }

    fn delete_matching(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        (**self).delete_matching(query)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
