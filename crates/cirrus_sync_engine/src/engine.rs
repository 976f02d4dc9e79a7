//! Round trips between cloud objects and the remote store.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteStore;
use cirrus_core::{
    ClassName, CloudObject, CoreError, LocalCache, ObjectId, QueryBuilder, SharedObject,
};
use cirrus_protocol::{
    CreateRequest, DeleteRequest, Endpoint, FetchRequest, ModifyRequest, ObjectRecord,
    UpdateRequest,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Statistics about round trips.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Requests sent to the remote store.
    pub round_trips: u64,
    /// Requests that failed, not counting not found answers.
    pub failures: u64,
    /// Objects created or updated.
    pub objects_saved: u64,
    /// Objects overwritten from the store.
    pub objects_refreshed: u64,
    /// Objects deleted one by one.
    pub objects_deleted: u64,
    /// Time of the last answered request.
    pub last_round_trip: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Every field was overwritten with the stored row.
    Refreshed,
    /// The row no longer exists; the object was reset to an unsaved
    /// placeholder of the same class.
    Reset,
}

/// Drives saves, refreshes, deletes and queries against a remote store.
///
/// Cheap to clone; clones share the store, the cache and the statistics.
/// Every I/O operation has a blocking form and an `_async` form that runs
/// the blocking form on tokio's blocking pool. Nothing is retried.
#[derive(Clone)]
pub struct SyncEngine {
    config: Arc<ClientConfig>,
    store: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    stats: Arc<RwLock<SyncStats>>,
}

impl SyncEngine {
    /// Creates an engine with a private object cache.
    pub fn new(config: ClientConfig, store: impl RemoteStore + 'static) -> Self {
        Self::with_cache(config, store, Arc::new(LocalCache::new()))
    }

    /// Creates an engine sharing `cache` with other engines.
    pub fn with_cache(config: ClientConfig, store: impl RemoteStore + 'static, cache: Arc<LocalCache>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            cache,
            stats: Arc::new(RwLock::new(SyncStats::default())),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The object cache.
    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Checks if the remote store is reachable.
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Starts a query using the configured default limit.
    pub fn query(&self, class_name: &str) -> SyncResult<QueryBuilder> {
        Ok(QueryBuilder::with_limit(
            ClassName::new(class_name)?,
            self.config.default_query_limit,
        ))
    }

    /// Returns a handle to an existing object. See [`LocalCache::reference`].
    pub fn reference(&self, class_name: &str, object_id: &str, use_cache: bool) -> SyncResult<SharedObject> {
        let class_name = ClassName::new(class_name)?;
        let object_id = ObjectId::parse(object_id)?;
        Ok(self.cache.reference(&class_name, object_id, use_cache))
    }

    /// Drops every cached object.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Sends an object's pending changes.
    ///
    /// A new object is created with all of its fields. A saved object
    /// sends only its dirty fields, cleared fields as removals; with no
    /// dirty fields nothing is sent. On failure the object is unchanged.
    ///
    /// A newly created object is cached as a copy, so a later cached
    /// [`reference`](Self::reference) to its id sees the saved fields. A
    /// cached copy with no unsaved changes follows later saves. Use
    /// [`save_shared`](Self::save_shared) to cache the instance itself.
    pub fn save(&self, object: &mut CloudObject) -> SyncResult<()> {
        let created = self.push(object)?;
        let Some(object_id) = object.object_id() else {
            return Ok(());
        };
        match self.cache.get(object.class_name(), object_id) {
            Some(shared) => {
                if let Some(mut cached) = shared.try_lock() {
                    if !cached.has_unsaved_changes() {
                        *cached = object.clone();
                    }
                }
            }
            None if created => {
                self.cache.insert(
                    object.class_name(),
                    object_id,
                    Arc::new(Mutex::new(object.clone())),
                );
            }
            None => {}
        }
        Ok(())
    }

    /// Saves a shared object; see [`save`](Self::save).
    ///
    /// A newly created object is cached as this very instance, unless
    /// another instance is already cached under its id.
    pub fn save_shared(&self, object: &SharedObject) -> SyncResult<()> {
        let (created, key) = {
            let mut guard = object.lock();
            let created = self.push(&mut guard)?;
            (created, guard.object_id().map(|id| (guard.class_name().clone(), id)))
        };
        if let (true, Some((class_name, object_id))) = (created, key) {
            self.cache.insert(&class_name, object_id, Arc::clone(object));
        }
        Ok(())
    }

    /// Creates or updates the row. Returns true if a row was created.
    fn push(&self, object: &mut CloudObject) -> SyncResult<bool> {
        object.validate_pending()?;
        let class_name = object.class_name().as_str().to_string();

        let created = match object.object_id() {
            None => {
                let request = CreateRequest {
                    class_name,
                    fields: object.creation_fields(),
                };
                let response = self.round_trip(Endpoint::Create, &request.class_name, || {
                    self.store.create(&request)
                })?;
                object.apply_created(&response);
                true
            }
            Some(object_id) => {
                let delta = object.pending_delta();
                if delta.is_empty() {
                    return Ok(false);
                }
                let request = UpdateRequest {
                    class_name,
                    object_id: *object_id.as_uuid(),
                    delta,
                };
                let response = self.round_trip(Endpoint::Update, &request.class_name, || {
                    self.store.update(&request)
                })?;
                object.apply_updated(&request.delta, response.updated_at);
                false
            }
        };
        self.stats.write().objects_saved += 1;
        Ok(created)
    }

    /// Overwrites an object with its stored row, discarding local changes.
    ///
    /// Fails with `NotFound`, leaving the object untouched, if it was never
    /// saved or is a placeholder whose id the store does not know. If the
    /// row of a synced object was deleted remotely the object is reset,
    /// evicted from the cache, and [`RefreshOutcome::Reset`] is returned.
    pub fn refresh(&self, object: &mut CloudObject) -> SyncResult<RefreshOutcome> {
        let Some(object_id) = object.object_id() else {
            return Err(SyncError::not_found(format!(
                "{} object was never saved",
                object.class_name()
            )));
        };
        let request = FetchRequest {
            class_name: object.class_name().as_str().to_string(),
            object_id: *object_id.as_uuid(),
        };
        match self.round_trip(Endpoint::Fetch, &request.class_name, || self.store.fetch(&request)) {
            Ok(record) => {
                object.apply_record(record);
                self.stats.write().objects_refreshed += 1;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e) if e.is_not_found() && !object.is_hydrated() => Err(e),
            Err(e) if e.is_not_found() => {
                debug!(class = %object.class_name(), id = %object_id, "object deleted remotely, resetting");
                self.cache.evict(object.class_name(), object_id);
                object.reset();
                Ok(RefreshOutcome::Reset)
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes an object's row and resets it to an unsaved placeholder.
    ///
    /// A later save creates a new row with a new id.
    pub fn delete(&self, object: &mut CloudObject) -> SyncResult<()> {
        let Some(object_id) = object.object_id() else {
            return Err(CoreError::invalid_operation(format!(
                "cannot delete unsaved {} object",
                object.class_name()
            ))
            .into());
        };
        let request = DeleteRequest {
            class_name: object.class_name().as_str().to_string(),
            object_id: *object_id.as_uuid(),
        };
        self.round_trip(Endpoint::Delete, &request.class_name, || self.store.delete(&request))?;
        self.cache.evict(object.class_name(), object_id);
        object.reset();
        self.stats.write().objects_deleted += 1;
        Ok(())
    }

    /// Runs a query. Zero matches is an empty list, not an error.
    ///
    /// Unprojected results also refresh cached instances of the same rows
    /// that have no unsaved changes and are not locked elsewhere.
    pub fn find(&self, query: &QueryBuilder) -> SyncResult<Vec<CloudObject>> {
        let descriptor = query.descriptor();
        let records = self.round_trip(Endpoint::Find, &descriptor.class_name, || {
            self.store.find(descriptor)
        })?;
        let reconcile = descriptor.selected_keys.is_empty();
        Ok(records
            .into_iter()
            .map(|record| self.materialize(query.class_name(), record, reconcile))
            .collect())
    }

    /// Reads one row of the query's class, projected to its selected keys.
    ///
    /// Returns `None` if the row does not exist.
    pub fn get_by_id(&self, query: &QueryBuilder, object_id: &str) -> SyncResult<Option<CloudObject>> {
        let object_id = ObjectId::parse(object_id)?;
        let descriptor = query.descriptor();
        let request = FetchRequest {
            class_name: descriptor.class_name.clone(),
            object_id: *object_id.as_uuid(),
        };
        match self.round_trip(Endpoint::Fetch, &request.class_name, || self.store.fetch(&request)) {
            Ok(record) => {
                let reconcile = descriptor.selected_keys.is_empty();
                let record = record.project(&descriptor.selected_keys);
                Ok(Some(self.materialize(query.class_name(), record, reconcile)))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Counts matching rows, ignoring limit and skip.
    pub fn try_count(&self, query: &QueryBuilder) -> SyncResult<u64> {
        let descriptor = query.descriptor();
        self.round_trip(Endpoint::Count, &descriptor.class_name, || {
            self.store.count(descriptor)
        })
    }

    /// Counts matching rows, returning `-1` on any failure.
    pub fn count(&self, query: &QueryBuilder) -> i64 {
        match self.try_count(query) {
            Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
            Err(e) => {
                warn!(class = %query.class_name(), error = %e, "count failed, returning -1");
                -1
            }
        }
    }

    /// Applies `example`'s pending changes to every matching row,
    /// ignoring limit and skip. Returns the number of rows modified.
    ///
    /// Only the example's dirty fields are sent; cleared fields become
    /// removals. A type mismatch on any row modifies nothing. The example
    /// itself is left as it was.
    pub fn modify_matching(&self, query: &QueryBuilder, example: &CloudObject) -> SyncResult<u64> {
        if example.class_name() != query.class_name() {
            return Err(CoreError::invalid_operation(format!(
                "example is a {} object, query targets {}",
                example.class_name(),
                query.class_name()
            ))
            .into());
        }
        if !example.has_unsaved_changes() {
            return Err(CoreError::invalid_operation("example object has no pending changes").into());
        }
        example.validate_pending()?;
        let request = ModifyRequest {
            query: query.descriptor().clone(),
            delta: example.pending_delta(),
        };
        self.round_trip(Endpoint::Modify, &request.query.class_name, || {
            self.store.modify(&request)
        })
    }

    /// Deletes every matching row, ignoring limit and skip. Returns the
    /// number of rows deleted.
    pub fn delete_matching(&self, query: &QueryBuilder) -> SyncResult<u64> {
        let descriptor = query.descriptor();
        self.round_trip(Endpoint::DeleteMatching, &descriptor.class_name, || {
            self.store.delete_matching(descriptor)
        })
    }

    /// Async form of [`save_shared`](Self::save_shared).
    pub async fn save_async(&self, object: SharedObject) -> SyncResult<()> {
        let engine = self.clone();
        run_blocking(move || engine.save_shared(&object)).await
    }

    /// Async form of [`refresh`](Self::refresh).
    pub async fn refresh_async(&self, object: SharedObject) -> SyncResult<RefreshOutcome> {
        let engine = self.clone();
        run_blocking(move || engine.refresh(&mut object.lock())).await
    }

    /// Async form of [`delete`](Self::delete).
    pub async fn delete_async(&self, object: SharedObject) -> SyncResult<()> {
        let engine = self.clone();
        run_blocking(move || engine.delete(&mut object.lock())).await
    }

    /// Async form of [`find`](Self::find).
    pub async fn find_async(&self, query: QueryBuilder) -> SyncResult<Vec<CloudObject>> {
        let engine = self.clone();
        run_blocking(move || engine.find(&query)).await
    }

    /// Async form of [`get_by_id`](Self::get_by_id).
    pub async fn get_by_id_async(&self, query: QueryBuilder, object_id: String) -> SyncResult<Option<CloudObject>> {
        let engine = self.clone();
        run_blocking(move || engine.get_by_id(&query, &object_id)).await
    }

    /// Async form of [`try_count`](Self::try_count).
    pub async fn count_async(&self, query: QueryBuilder) -> SyncResult<u64> {
        let engine = self.clone();
        run_blocking(move || engine.try_count(&query)).await
    }

    /// Async form of [`modify_matching`](Self::modify_matching).
    pub async fn modify_matching_async(&self, query: QueryBuilder, example: CloudObject) -> SyncResult<u64> {
        let engine = self.clone();
        run_blocking(move || engine.modify_matching(&query, &example)).await
    }

    /// Async form of [`delete_matching`](Self::delete_matching).
    pub async fn delete_matching_async(&self, query: QueryBuilder) -> SyncResult<u64> {
        let engine = self.clone();
        run_blocking(move || engine.delete_matching(&query)).await
    }

    /// Builds an object from a row, refreshing the cached instance if allowed.
    fn materialize(&self, class_name: &ClassName, record: ObjectRecord, reconcile: bool) -> CloudObject {
        if reconcile {
            let object_id = ObjectId::from_uuid(record.object_id);
            if let Some(shared) = self.cache.get(class_name, object_id) {
                // Never wait on a caller holding the instance.
                if let Some(mut cached) = shared.try_lock() {
                    if !cached.has_unsaved_changes() {
                        cached.apply_record(record.clone());
                    }
                }
            }
        }
        let mut object = CloudObject::new(class_name.clone());
        object.apply_record(record);
        object
    }

    fn round_trip<T>(&self, endpoint: Endpoint, class_name: &str, call: impl FnOnce() -> SyncResult<T>) -> SyncResult<T> {
        debug!(endpoint = %endpoint, class = class_name, "sending request");
        let result = call();
        let mut stats = self.stats.write();
        stats.round_trips += 1;
        match &result {
            Ok(_) => {
                stats.last_round_trip = Some(Instant::now());
                stats.last_error = None;
            }
            Err(e) if e.is_not_found() => {
                stats.last_round_trip = Some(Instant::now());
                debug!(endpoint = %endpoint, class = class_name, "not found");
            }
            Err(e) => self.handle_error(&mut stats, endpoint, e),
        }
        result
    }

    fn handle_error(&self, stats: &mut SyncStats, endpoint: Endpoint, error: &SyncError) {
        warn!(endpoint = %endpoint, error = %error, "request failed");
        stats.failures += 1;
        stats.last_error = Some(error.to_string());
    }
}

async fn run_blocking<T, F>(call: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| SyncError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use cirrus_core::{CompareOp, Value};

    fn engine() -> (SyncEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SyncEngine::new(ClientConfig::new("app"), Arc::clone(&store)), store)
    }

    fn saved(engine: &SyncEngine, score: i32) -> CloudObject {
        let mut object = CloudObject::create("game").unwrap();
        object.set("score", score).unwrap();
        engine.save(&mut object).unwrap();
        object
    }

    #[test]
    fn save_creates_then_updates() {
        let (engine, store) = engine();
        let mut object = saved(&engine, 1);
        let id = object.object_id().unwrap();
        let created = object.updated_at().unwrap();
        assert!(!object.has_unsaved_changes());

        object.set("score", 2).unwrap();
        engine.save(&mut object).unwrap();
        assert_eq!(object.object_id(), Some(id));
        assert!(object.updated_at().unwrap() > created);
        assert_eq!(store.records("game")[0].fields["score"], Value::Int32(2));
        assert_eq!(engine.stats().objects_saved, 2);
    }

    #[test]
    fn clean_save_sends_nothing() {
        let (engine, _store) = engine();
        let mut object = saved(&engine, 1);
        let trips = engine.stats().round_trips;
        engine.save(&mut object).unwrap();
        assert_eq!(engine.stats().round_trips, trips);
    }

    #[test]
    fn local_errors_skip_io() {
        let (engine, _store) = engine();
        let mut object = CloudObject::create("game").unwrap();
        assert!(engine.delete(&mut object).unwrap_err().is_local());
        assert!(engine.refresh(&mut object).unwrap_err().is_not_found());
        assert_eq!(engine.stats().round_trips, 0);
    }

    #[test]
    fn delete_resets_and_evicts() {
        let (engine, store) = engine();
        let object = saved(&engine, 1);
        let id = object.object_id().unwrap().to_string();

        let shared = engine.reference("game", &id, true).unwrap();
        engine.refresh(&mut shared.lock()).unwrap();
        engine.delete(&mut shared.lock()).unwrap();

        assert!(shared.lock().is_new());
        assert_eq!(shared.lock().class_name().as_str(), "game");
        assert!(engine.cache().is_empty());
        assert_eq!(store.row_count("game"), 0);
    }

    #[test]
    fn find_reconciles_clean_cached_instances() {
        let (engine, _store) = engine();
        let object = saved(&engine, 1);
        let id = object.object_id().unwrap().to_string();

        let clean = engine.reference("game", &id, true).unwrap();
        let query = engine.query("game").unwrap();
        let found = engine.find(&query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(clean.lock().get("score"), Some(&Value::Int32(1)));

        clean.lock().set("score", 9).unwrap();
        engine.find(&query).unwrap();
        assert_eq!(clean.lock().get("score"), Some(&Value::Int32(9)));
    }

    #[test]
    fn count_sentinel_on_failure() {
        let (engine, store) = engine();
        let mut query = engine.query("game").unwrap();
        query.where_key("score", CompareOp::GreaterThan, 1).unwrap();
        assert_eq!(engine.count(&query), 0);

        store.set_online(false);
        assert_eq!(engine.count(&query), -1);
        let stats = engine.stats();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.is_some());
    }

    #[test]
    fn modify_needs_pending_changes_of_same_class() {
        let (engine, _store) = engine();
        let query = engine.query("game").unwrap();
        let clean = CloudObject::create("game").unwrap();
        assert!(engine.modify_matching(&query, &clean).unwrap_err().is_local());

        let mut other = CloudObject::create("player").unwrap();
        other.set("x", 1).unwrap();
        assert!(engine.modify_matching(&query, &other).unwrap_err().is_local());
        assert_eq!(engine.stats().round_trips, 0);
    }

    #[test]
    fn query_uses_configured_limit() {
        let store = MemoryStore::new();
        let engine = SyncEngine::new(ClientConfig::new("app").with_default_query_limit(7), store);
        let mut query = engine.query("game").unwrap();
        assert_eq!(query.limit(), 7);
        query.set_limit(1).reset();
        assert_eq!(query.limit(), 7);
    }

    #[tokio::test]
    async fn async_save_and_refresh() {
        let (engine, _store) = engine();
        let object: SharedObject = Arc::new(Mutex::new(CloudObject::create("game").unwrap()));
        object.lock().set("score", 4).unwrap();

        engine.save_async(Arc::clone(&object)).await.unwrap();
        assert!(object.lock().object_id().is_some());

        object.lock().set("score", 5).unwrap();
        let outcome = engine.refresh_async(Arc::clone(&object)).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(object.lock().get("score"), Some(&Value::Int32(4)));
    }
}
