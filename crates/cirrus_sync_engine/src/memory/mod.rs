//! In-process remote store.
//!
//! Keeps every class in memory with the same observable behavior as the
//! hosted service: server-assigned ids and timestamps, column types fixed
//! by the first write, SQL null semantics, and all-or-nothing bulk writes.

mod eval;

use crate::error::{SyncError, SyncResult};
use crate::http::LoopbackServer;
use crate::transport::RemoteStore;
use cirrus_codec::{
    from_json_bytes, generate_uuid, is_system_field, normalize_identifier, to_json_bytes,
    CloudDate, TypeTag, Uuid, Value,
};
use cirrus_core::FILE_CLASS;
use cirrus_protocol::{
    Ack, CountResponse, CreateRequest, CreateResponse, DeleteRequest, Endpoint, FetchRequest,
    FieldChange, FieldDelta, FieldMap, FindResponse, ModifyRequest, ObjectRecord,
    QueryDescriptor, Reply, RequestEnvelope, ServerFailure, UpdateRequest, UpdateResponse,
};
use eval::{Filter, Schema};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct ClassTable {
    schema: Schema,
    /// Rows in insertion order.
    rows: Vec<ObjectRecord>,
}

impl ClassTable {
    fn position(&self, object_id: &Uuid) -> Option<usize> {
        self.rows.iter().position(|r| r.object_id == *object_id)
    }

    fn record_types<'a>(&mut self, values: impl Iterator<Item = (&'a String, &'a Value)>) {
        for (key, value) in values {
            if !value.is_null() {
                self.schema.entry(key.clone()).or_insert(value.type_tag());
            }
        }
    }

    /// Indices of matching rows, in insertion order.
    fn matching(&self, filter: &Filter) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.matches(r))
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    classes: HashMap<String, ClassTable>,
    last_millis: i64,
}

impl StoreState {
    /// Next timestamp, strictly after every one handed out before.
    fn tick(&mut self) -> SyncResult<CloudDate> {
        let millis = CloudDate::now().to_millis().max(self.last_millis + 1);
        self.last_millis = millis;
        Ok(CloudDate::from_millis(millis)?)
    }
}

/// A remote store living in the current process.
///
/// Used for tests and offline development; reachable directly through
/// [`RemoteStore`] or over the JSON wire through
/// [`LoopbackClient`](crate::LoopbackClient).
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    online: AtomicBool,
    app_key: Option<String>,
}

impl MemoryStore {
    /// Creates an empty store accepting any application key.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            online: AtomicBool::new(true),
            app_key: None,
        }
    }

    /// Creates an empty store that only answers wire requests carrying `app_key`.
    pub fn with_app_key(app_key: impl Into<String>) -> Self {
        Self {
            app_key: Some(app_key.into()),
            ..Self::new()
        }
    }

    /// Simulates losing or regaining connectivity. While offline every
    /// call fails with a network error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true unless [`set_online`](Self::set_online) took the store offline.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of rows in a class.
    pub fn row_count(&self, class_name: &str) -> usize {
        self.state
            .read()
            .classes
            .get(class_name)
            .map_or(0, |t| t.rows.len())
    }

    /// Type of a column, once a non-null value has been written to it.
    pub fn column_type(&self, class_name: &str, key: &str) -> Option<TypeTag> {
        self.state
            .read()
            .classes
            .get(class_name)
            .and_then(|t| t.schema.get(key).copied())
    }

    /// Snapshot of every row of a class, in insertion order.
    pub fn records(&self, class_name: &str) -> Vec<ObjectRecord> {
        self.state
            .read()
            .classes
            .get(class_name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::network("store is offline"))
        }
    }

    fn rejected<T>(&self, endpoint: Endpoint, error: SyncError) -> SyncResult<T> {
        warn!(endpoint = %endpoint, error = %error, "request rejected");
        Err(error)
    }

    /// Runs a query and returns matching row indices in insertion order.
    fn select(table: &ClassTable, query: &QueryDescriptor) -> SyncResult<Vec<usize>> {
        let filter = Filter::compile(query, &table.schema)?;
        Ok(table.matching(&filter))
    }

    fn insert_row(&self, request: &CreateRequest) -> SyncResult<CreateResponse> {
        check_class(&request.class_name)?;
        let mut state = self.state.write();
        let now = state.tick()?;
        let table = state.classes.entry(request.class_name.clone()).or_default();
        check_values(&table.schema, request.fields.iter())?;
        table.record_types(request.fields.iter());

        let record = ObjectRecord {
            class_name: request.class_name.clone(),
            object_id: generate_uuid(),
            created_at: now,
            updated_at: now,
            fields: request.fields.clone(),
        };
        let response = CreateResponse {
            object_id: record.object_id,
            created_at: now,
            updated_at: now,
        };
        table.rows.push(record);
        Ok(response)
    }

    fn update_row(&self, request: &UpdateRequest) -> SyncResult<UpdateResponse> {
        let missing = || SyncError::not_found(format!("{}/{}", request.class_name, request.object_id));
        let mut state = self.state.write();
        let now = state.tick()?;
        let table = state.classes.get_mut(&request.class_name).ok_or_else(missing)?;
        let index = table.position(&request.object_id).ok_or_else(missing)?;
        check_delta(&table.schema, &request.delta)?;
        table.record_types(delta_values(&request.delta));

        let row = &mut table.rows[index];
        row.apply(&request.delta);
        row.updated_at = now;
        Ok(UpdateResponse { updated_at: now })
    }

    /// Validates the query and the delta before touching any row.
    fn modify_rows(&self, request: &ModifyRequest) -> SyncResult<u64> {
        let query = &request.query;
        let mut state = self.state.write();
        let now = state.tick()?;
        let Some(table) = state.classes.get_mut(&query.class_name) else {
            return Ok(0);
        };
        let indices = Self::select(table, query)?;
        check_delta(&table.schema, &request.delta)?;
        if indices.is_empty() {
            return Ok(0);
        }
        table.record_types(delta_values(&request.delta));
        for &i in &indices {
            let row = &mut table.rows[i];
            row.apply(&request.delta);
            row.updated_at = now;
        }
        Ok(indices.len() as u64)
    }

    /// Handles one wire request: checks credentials, runs the call and
    /// encodes its outcome.
    fn serve<Req, Res>(
        &self,
        body: &[u8],
        call: impl FnOnce(&Self, Req) -> SyncResult<Res>,
    ) -> Result<Vec<u8>, String>
    where
        Req: DeserializeOwned,
        Res: Serialize,
    {
        let reply: Reply<Res> = match from_json_bytes::<RequestEnvelope<Req>>(body) {
            Err(e) => Reply::Err(ServerFailure::from(&SyncError::InvalidRequest(e.to_string()))),
            Ok(envelope) if !self.accepts(&envelope.app_key) => {
                warn!("wire request with unknown application key");
                Reply::Err(ServerFailure::from(&SyncError::Unauthorized(
                    "unknown application key".into(),
                )))
            }
            Ok(envelope) => call(self, envelope.body)
                .map_err(|e| ServerFailure::from(&e))
                .into(),
        };
        to_json_bytes(&reply).map_err(|e| e.to_string())
    }

    fn accepts(&self, app_key: &str) -> bool {
        self.app_key.as_deref().map_or(true, |key| key == app_key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_class(class_name: &str) -> SyncResult<()> {
    if class_name == FILE_CLASS || normalize_identifier(class_name).ok().as_deref() == Some(class_name) {
        Ok(())
    } else {
        Err(SyncError::InvalidRequest(format!("invalid class name {class_name}")))
    }
}

/// Checks written values against the column types. Nothing is written
/// if any value fails.
fn check_values<'a>(
    schema: &Schema,
    values: impl Iterator<Item = (&'a String, &'a Value)>,
) -> SyncResult<()> {
    for (key, value) in values {
        if is_system_field(key) {
            return Err(SyncError::InvalidRequest(format!("{key} is read-only")));
        }
        if normalize_identifier(key).ok().as_deref() != Some(key.as_str()) {
            return Err(SyncError::InvalidRequest(format!("invalid key {key}")));
        }
        value
            .validate()
            .map_err(|e| SyncError::InvalidRequest(format!("{key}: {e}")))?;
        if value.is_null() {
            continue;
        }
        if let Some(column) = schema.get(key) {
            if *column != value.type_tag() {
                return Err(SyncError::type_mismatch(format!(
                    "{key} is {column}, got {}",
                    value.type_tag()
                )));
            }
        }
    }
    Ok(())
}

fn delta_values(delta: &FieldDelta) -> impl Iterator<Item = (&String, &Value)> {
    delta.iter().filter_map(|(key, change)| match change {
        FieldChange::Set(value) => Some((key, value)),
        FieldChange::Clear => None,
    })
}

fn check_delta(schema: &Schema, delta: &FieldDelta) -> SyncResult<()> {
    for key in delta.keys() {
        if is_system_field(key) {
            return Err(SyncError::InvalidRequest(format!("{key} is read-only")));
        }
    }
    check_values(schema, delta_values(delta))
}

impl RemoteStore for MemoryStore {
    fn create(&self, request: &CreateRequest) -> SyncResult<CreateResponse> {
        self.check_online()?;
        match self.insert_row(request) {
            Ok(response) => {
                debug!(class = %request.class_name, id = %response.object_id, "row created");
                Ok(response)
            }
            Err(e) => self.rejected(Endpoint::Create, e),
        }
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<ObjectRecord> {
        self.check_online()?;
        let state = self.state.read();
        state
            .classes
            .get(&request.class_name)
            .and_then(|t| t.position(&request.object_id).map(|i| t.rows[i].clone()))
            .ok_or_else(|| {
                SyncError::not_found(format!("{}/{}", request.class_name, request.object_id))
            })
    }

    fn update(&self, request: &UpdateRequest) -> SyncResult<UpdateResponse> {
        self.check_online()?;
        match self.update_row(request) {
            Ok(response) => {
                debug!(class = %request.class_name, id = %request.object_id, fields = request.delta.len(), "row updated");
                Ok(response)
            }
            Err(e) => self.rejected(Endpoint::Update, e),
        }
    }

    fn delete(&self, request: &DeleteRequest) -> SyncResult<()> {
        self.check_online()?;
        let mut state = self.state.write();
        let removed = state.classes.get_mut(&request.class_name).and_then(|t| {
            t.position(&request.object_id).map(|i| t.rows.remove(i))
        });
        match removed {
            Some(_) => {
                debug!(class = %request.class_name, id = %request.object_id, "row deleted");
                Ok(())
            }
            None => Err(SyncError::not_found(format!(
                "{}/{}",
                request.class_name, request.object_id
            ))),
        }
    }

    fn find(&self, query: &QueryDescriptor) -> SyncResult<Vec<ObjectRecord>> {
        self.check_online()?;
        let state = self.state.read();
        let Some(table) = state.classes.get(&query.class_name) else {
            return Ok(Vec::new());
        };
        let indices = match Self::select(table, query) {
            Ok(indices) => indices,
            Err(e) => return self.rejected(Endpoint::Find, e),
        };
        let mut records: Vec<_> = indices.into_iter().map(|i| table.rows[i].clone()).collect();
        eval::sort(&mut records, &query.sort_keys);
        let records = eval::page(records, query);
        debug!(class = %query.class_name, rows = records.len(), "query ran");
        Ok(records)
    }

    fn count(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        self.check_online()?;
        let state = self.state.read();
        let Some(table) = state.classes.get(&query.class_name) else {
            return Ok(0);
        };
        match Self::select(table, query) {
            Ok(indices) => Ok(indices.len() as u64),
            Err(e) => self.rejected(Endpoint::Count, e),
        }
    }

    fn modify(&self, request: &ModifyRequest) -> SyncResult<u64> {
        self.check_online()?;
        match self.modify_rows(request) {
            Ok(count) => {
                debug!(class = %request.query.class_name, rows = count, "rows modified");
                Ok(count)
            }
            Err(e) => self.rejected(Endpoint::Modify, e),
        }
    }

    fn delete_matching(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        self.check_online()?;
        let mut state = self.state.write();
        let Some(table) = state.classes.get_mut(&query.class_name) else {
            return Ok(0);
        };
        let indices = match Self::select(table, query) {
            Ok(indices) => indices,
            Err(e) => return self.rejected(Endpoint::DeleteMatching, e),
        };
        let mut index = 0;
        table.rows.retain(|_| {
            let keep = indices.binary_search(&index).is_err();
            index += 1;
            keep
        });
        debug!(class = %query.class_name, rows = indices.len(), "rows deleted");
        Ok(indices.len() as u64)
    }

    fn is_available(&self) -> bool {
        self.is_online()
    }
}

impl LoopbackServer for MemoryStore {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        if !self.is_online() {
            return Err("connection refused".into());
        }
        let endpoint = Endpoint::from_path(path).ok_or_else(|| format!("no route for {path}"))?;
        match endpoint {
            Endpoint::Create => self.serve(body, |s, r: CreateRequest| s.create(&r)),
            Endpoint::Fetch => self.serve(body, |s, r: FetchRequest| s.fetch(&r)),
            Endpoint::Update => self.serve(body, |s, r: UpdateRequest| s.update(&r)),
            Endpoint::Delete => self.serve(body, |s, r: DeleteRequest| s.delete(&r).map(|()| Ack {})),
            Endpoint::Find => self.serve(body, |s, q: QueryDescriptor| {
                s.find(&q).map(|records| FindResponse { records })
            }),
            Endpoint::Count => self.serve(body, |s, q: QueryDescriptor| {
                s.count(&q).map(|count| CountResponse { count })
            }),
            Endpoint::Modify => self.serve(body, |s, r: ModifyRequest| {
                s.modify(&r).map(|count| CountResponse { count })
            }),
            Endpoint::DeleteMatching => self.serve(body, |s, q: QueryDescriptor| {
                s.delete_matching(&q).map(|count| CountResponse { count })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_protocol::{CompareOp, Constraint};

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn create(store: &MemoryStore, pairs: &[(&str, Value)]) -> CreateResponse {
        store
            .create(&CreateRequest {
                class_name: "game".into(),
                fields: fields(pairs),
            })
            .unwrap()
    }

    fn score_query(op: CompareOp, score: i32) -> QueryDescriptor {
        let mut query = QueryDescriptor::new("game", 100);
        query.constraints.push(Constraint::compare("score", op, Value::Int32(score)));
        query
    }

    #[test]
    fn create_assigns_identity() {
        let store = MemoryStore::new();
        let a = create(&store, &[("score", Value::Int32(1))]);
        let b = create(&store, &[("score", Value::Int32(2))]);
        assert_ne!(a.object_id, b.object_id);
        assert_eq!(a.created_at, a.updated_at);
        assert!(b.created_at > a.created_at);
        assert_eq!(store.row_count("game"), 2);
        assert_eq!(store.column_type("game", "score"), Some(TypeTag::Int32));
    }

    #[test]
    fn first_write_fixes_column_type() {
        let store = MemoryStore::new();
        create(&store, &[("score", Value::Null)]);
        assert_eq!(store.column_type("game", "score"), None);

        create(&store, &[("score", Value::Int64(1))]);
        let err = store
            .create(&CreateRequest {
                class_name: "game".into(),
                fields: fields(&[("name", Value::from("x")), ("score", Value::Int32(1))]),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
        assert_eq!(store.row_count("game"), 2);
        assert_eq!(store.column_type("game", "name"), None);
    }

    #[test]
    fn rejects_system_and_invalid_keys() {
        let store = MemoryStore::new();
        for key in ["objectid", "Bad", "1x"] {
            let err = store
                .create(&CreateRequest {
                    class_name: "game".into(),
                    fields: fields(&[(key, Value::Int32(1))]),
                })
                .unwrap_err();
            assert!(matches!(err, SyncError::InvalidRequest(_)), "{key}");
        }
        assert!(store
            .create(&CreateRequest {
                class_name: "bad__".into(),
                fields: FieldMap::new(),
            })
            .is_err());
    }

    #[test]
    fn update_is_all_or_nothing() {
        let store = MemoryStore::new();
        let created = create(&store, &[("score", Value::Int32(1)), ("name", Value::from("a"))]);

        let mut delta = FieldDelta::new();
        delta.insert("name".into(), FieldChange::Set(Value::from("b")));
        delta.insert("score".into(), FieldChange::Set(Value::from("oops")));
        let err = store
            .update(&UpdateRequest {
                class_name: "game".into(),
                object_id: created.object_id,
                delta,
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));

        let row = &store.records("game")[0];
        assert_eq!(row.fields["name"], Value::from("a"));
        assert_eq!(row.updated_at, created.updated_at);
    }

    #[test]
    fn update_and_fetch() {
        let store = MemoryStore::new();
        let created = create(&store, &[("score", Value::Int32(1)), ("name", Value::from("a"))]);

        let mut delta = FieldDelta::new();
        delta.insert("score".into(), FieldChange::Set(Value::Int32(2)));
        delta.insert("name".into(), FieldChange::Clear);
        let response = store
            .update(&UpdateRequest {
                class_name: "game".into(),
                object_id: created.object_id,
                delta,
            })
            .unwrap();
        assert!(response.updated_at > created.updated_at);

        let record = store
            .fetch(&FetchRequest {
                class_name: "game".into(),
                object_id: created.object_id,
            })
            .unwrap();
        assert_eq!(record.fields, fields(&[("score", Value::Int32(2))]));
        assert_eq!(record.updated_at, response.updated_at);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let store = MemoryStore::new();
        let request = FetchRequest {
            class_name: "game".into(),
            object_id: generate_uuid(),
        };
        assert!(store.fetch(&request).unwrap_err().is_not_found());
        let delete = DeleteRequest {
            class_name: "game".into(),
            object_id: request.object_id,
        };
        assert!(store.delete(&delete).unwrap_err().is_not_found());
    }

    #[test]
    fn unknown_class_is_empty() {
        let store = MemoryStore::new();
        let query = QueryDescriptor::new("nothing", 10);
        assert!(store.find(&query).unwrap().is_empty());
        assert_eq!(store.count(&query).unwrap(), 0);
        assert_eq!(store.delete_matching(&query).unwrap(), 0);
    }

    #[test]
    fn count_ignores_paging() {
        let store = MemoryStore::new();
        for score in [5, 10, 15, 20, 25] {
            create(&store, &[("score", Value::Int32(score))]);
        }
        let mut query = score_query(CompareOp::GreaterThan, 5);
        query.limit = 1;
        query.skip = 1;
        assert_eq!(store.count(&query).unwrap(), 4);
        assert_eq!(store.find(&query).unwrap().len(), 1);
    }

    #[test]
    fn modify_matching_rows() {
        let store = MemoryStore::new();
        for score in [5, 10, 15] {
            create(&store, &[("score", Value::Int32(score))]);
        }
        let mut delta = FieldDelta::new();
        delta.insert("flag".into(), FieldChange::Set(Value::Bool(true)));
        let affected = store
            .modify(&ModifyRequest {
                query: score_query(CompareOp::GreaterOrEqual, 10),
                delta,
            })
            .unwrap();
        assert_eq!(affected, 2);

        let flagged = store
            .records("game")
            .iter()
            .filter(|r| r.fields.get("flag") == Some(&Value::Bool(true)))
            .count();
        assert_eq!(flagged, 2);
    }

    #[test]
    fn modify_type_mismatch_changes_nothing() {
        let store = MemoryStore::new();
        for score in [5, 10] {
            create(&store, &[("score", Value::Int32(score))]);
        }
        let before = store.records("game");
        let mut delta = FieldDelta::new();
        delta.insert("score".into(), FieldChange::Set(Value::Double(1.5)));
        let err = store
            .modify(&ModifyRequest {
                query: QueryDescriptor::new("game", 10),
                delta,
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
        assert_eq!(store.records("game"), before);
    }

    #[test]
    fn delete_matching_rows() {
        let store = MemoryStore::new();
        for score in [5, 10, 15, 20] {
            create(&store, &[("score", Value::Int32(score))]);
        }
        let deleted = store
            .delete_matching(&score_query(CompareOp::LessThan, 12))
            .unwrap();
        assert_eq!(deleted, 2);
        let left: Vec<_> = store
            .records("game")
            .iter()
            .map(|r| r.fields["score"].clone())
            .collect();
        assert_eq!(left, vec![Value::Int32(15), Value::Int32(20)]);
    }

    #[test]
    fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_online(false);
        assert!(!store.is_available());
        let err = store.count(&QueryDescriptor::new("game", 1)).unwrap_err();
        assert!(matches!(err, SyncError::Network { .. }));
        assert!(store.handle_post(Endpoint::Count.path(), b"{}").is_err());

        store.set_online(true);
        assert_eq!(store.count(&QueryDescriptor::new("game", 1)).unwrap(), 0);
    }

    #[test]
    fn wire_requests_check_app_key() {
        let store = MemoryStore::with_app_key("app-1");
        let query = QueryDescriptor::new("game", 1);

        let good = to_json_bytes(&RequestEnvelope::new("app-1", None, query.clone())).unwrap();
        let reply: Reply<CountResponse> =
            from_json_bytes(&store.handle_post("/query/count", &good).unwrap()).unwrap();
        assert_eq!(reply, Reply::Ok(CountResponse { count: 0 }));

        let bad = to_json_bytes(&RequestEnvelope::new("other", None, query)).unwrap();
        let reply: Reply<CountResponse> =
            from_json_bytes(&store.handle_post("/query/count", &bad).unwrap()).unwrap();
        let failure = reply.into_result().unwrap_err();
        assert!(matches!(SyncError::from(failure), SyncError::Unauthorized(_)));

        assert!(store.handle_post("/nowhere", &good).is_err());
    }
}
