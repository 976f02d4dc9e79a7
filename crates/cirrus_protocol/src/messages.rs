//! Request and response messages exchanged with the remote store.

use crate::query::QueryDescriptor;
use crate::record::{FieldDelta, FieldMap, ObjectRecord};
use cirrus_codec::{CloudDate, Uuid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote store endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Insert a new row.
    Create,
    /// Read one row by id.
    Fetch,
    /// Apply a delta to one row.
    Update,
    /// Delete one row by id.
    Delete,
    /// Run a query.
    Find,
    /// Count the rows a query matches.
    Count,
    /// Apply a delta to every row a query matches.
    Modify,
    /// Delete every row a query matches.
    DeleteMatching,
}

impl Endpoint {
    /// Every endpoint, in declaration order.
    pub const ALL: [Endpoint; 8] = [
        Endpoint::Create,
        Endpoint::Fetch,
        Endpoint::Update,
        Endpoint::Delete,
        Endpoint::Find,
        Endpoint::Count,
        Endpoint::Modify,
        Endpoint::DeleteMatching,
    ];

    /// URL path of the endpoint, relative to the service base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Create => "/objects/create",
            Endpoint::Fetch => "/objects/fetch",
            Endpoint::Update => "/objects/update",
            Endpoint::Delete => "/objects/delete",
            Endpoint::Find => "/query/find",
            Endpoint::Count => "/query/count",
            Endpoint::Modify => "/query/modify",
            Endpoint::DeleteMatching => "/query/delete",
        }
    }

    /// Looks up an endpoint by path.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.path() == path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Insert a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Normalized class name.
    pub class_name: String,
    /// Initial fields.
    pub fields: FieldMap,
}

/// Server-assigned identity of a newly created row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// New object id.
    pub object_id: Uuid,
    /// Creation timestamp.
    pub created_at: CloudDate,
    /// Update timestamp, equal to `created_at`.
    pub updated_at: CloudDate,
}

/// Read one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Normalized class name.
    pub class_name: String,
    /// Row id.
    pub object_id: Uuid,
}

/// Apply a delta to one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Normalized class name.
    pub class_name: String,
    /// Row id.
    pub object_id: Uuid,
    /// Changes to apply.
    pub delta: FieldDelta,
}

/// Result of a single-row update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// New update timestamp.
    pub updated_at: CloudDate,
}

/// Delete one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Normalized class name.
    pub class_name: String,
    /// Row id.
    pub object_id: Uuid,
}

/// Apply a delta to every row matched by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    /// Rows to modify. Limit and skip are ignored.
    pub query: QueryDescriptor,
    /// Changes to apply.
    pub delta: FieldDelta,
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    /// Matching rows, in query order.
    pub records: Vec<ObjectRecord>,
}

/// Number of rows matched or affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    /// Row count.
    pub count: u64,
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {}

/// A request body together with the caller's credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<B> {
    /// Application key.
    pub app_key: String,
    /// Master key, if the caller holds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
    /// Request body.
    pub body: B,
}

impl<B> RequestEnvelope<B> {
    /// Wraps a body.
    pub fn new(app_key: impl Into<String>, master_key: Option<String>, body: B) -> Self {
        Self {
            app_key: app_key.into(),
            master_key,
            body,
        }
    }
}

/// Category of a failure reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target row does not exist.
    NotFound,
    /// Value type disagrees with the column type.
    TypeMismatch,
    /// Malformed or invalid request.
    InvalidRequest,
    /// Credentials rejected.
    Unauthorized,
    /// Any other server-side failure.
    Internal,
}

/// A failure reported by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFailure {
    /// Category.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
}

impl ServerFailure {
    /// Creates a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Response body: either a success payload or a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply<T> {
    /// Success payload.
    Ok(T),
    /// Failure.
    Err(ServerFailure),
}

impl<T> Reply<T> {
    /// Converts into a standard result.
    pub fn into_result(self) -> Result<T, ServerFailure> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Err(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, ServerFailure>> for Reply<T> {
    fn from(result: Result<T, ServerFailure>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(failure) => Reply::Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_codec::{from_json_bytes, generate_uuid, to_json_bytes, Value};

    #[test]
    fn endpoint_paths_are_unique() {
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::from_path(endpoint.path()), Some(endpoint));
        }
        assert_eq!(Endpoint::from_path("/sync/pull"), None);
    }

    #[test]
    fn envelope_omits_missing_master_key() {
        let body = FetchRequest {
            class_name: "game".into(),
            object_id: generate_uuid(),
        };
        let envelope = RequestEnvelope::new("app", None, body.clone());
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("master_key").is_none());
        assert_eq!(json["app_key"], "app");

        let bytes = to_json_bytes(&envelope).unwrap();
        let back: RequestEnvelope<FetchRequest> = from_json_bytes(&bytes).unwrap();
        assert_eq!(back.body, body);
        assert_eq!(back.master_key, None);
    }

    #[test]
    fn reply_shape() {
        let ok: Reply<CountResponse> = Reply::Ok(CountResponse { count: 3 });
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({"ok": {"count": 3}}));

        let err: Reply<CountResponse> =
            Reply::Err(ServerFailure::new(FailureKind::TypeMismatch, "score is int32"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["err"]["kind"], "type_mismatch");

        let back: Reply<CountResponse> = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_result().unwrap_err().kind, FailureKind::TypeMismatch);
    }

    #[test]
    fn create_request_carries_typed_fields() {
        let mut fields = FieldMap::new();
        fields.insert("score".into(), Value::Int64(7));
        let request = CreateRequest {
            class_name: "game".into(),
            fields,
        };
        let back: CreateRequest = from_json_bytes(&to_json_bytes(&request).unwrap()).unwrap();
        assert_eq!(back.fields.get("score"), Some(&Value::Int64(7)));
    }
}
