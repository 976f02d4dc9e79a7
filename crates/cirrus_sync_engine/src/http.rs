//! HTTP transport implementation.
//!
//! Requests are JSON envelopes carrying the application credentials,
//! posted to `base_url + endpoint path`. Responses are JSON [`Reply`]
//! bodies. The actual HTTP client is abstracted via a trait so any
//! library (reqwest, hyper, ureq) can be plugged in.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteStore;
use cirrus_codec::{from_json_bytes, to_json_bytes};
use cirrus_protocol::{
    Ack, CountResponse, CreateRequest, CreateResponse, DeleteRequest, Endpoint, FetchRequest,
    FindResponse, ModifyRequest, ObjectRecord, QueryDescriptor, Reply, RequestEnvelope,
    UpdateRequest, UpdateResponse,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. The client
/// is expected to honor [`ClientConfig::timeout`].
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// Remote store reached over HTTP.
pub struct HttpTransport<C: HttpClient> {
    config: ClientConfig,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(config: ClientConfig, client: C) -> Self {
        Self {
            config,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint.path())
    }

    fn post_json<Req, Res>(&self, endpoint: Endpoint, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let envelope = RequestEnvelope::new(
            self.config.app_key.as_str(),
            self.config.master_key.clone(),
            request,
        );
        let body = to_json_bytes(&envelope)?;

        let url = self.url(endpoint);
        debug!(url = %url, bytes = body.len(), "posting request");
        let response_body = self.client.post(&url, body).map_err(|e| {
            warn!(url = %url, error = %e, "transport failure");
            *self.last_error.write() = Some(e.clone());
            SyncError::network(e)
        })?;
        *self.last_error.write() = None;

        let reply: Reply<Res> = from_json_bytes(&response_body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))?;
        reply.into_result().map_err(SyncError::from)
    }
}

impl<C: HttpClient> RemoteStore for HttpTransport<C> {
    fn create(&self, request: &CreateRequest) -> SyncResult<CreateResponse> {
        self.post_json(Endpoint::Create, request)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<ObjectRecord> {
        self.post_json(Endpoint::Fetch, request)
    }

    fn update(&self, request: &UpdateRequest) -> SyncResult<UpdateResponse> {
        self.post_json(Endpoint::Update, request)
    }

    fn delete(&self, request: &DeleteRequest) -> SyncResult<()> {
        self.post_json::<_, Ack>(Endpoint::Delete, request).map(|_| ())
    }

    fn find(&self, query: &QueryDescriptor) -> SyncResult<Vec<ObjectRecord>> {
        self.post_json::<_, FindResponse>(Endpoint::Find, query)
            .map(|r| r.records)
    }

    fn count(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        self.post_json::<_, CountResponse>(Endpoint::Count, query)
            .map(|r| r.count)
    }

    fn modify(&self, request: &ModifyRequest) -> SyncResult<u64> {
        self.post_json::<_, CountResponse>(Endpoint::Modify, request)
            .map(|r| r.count)
    }

    fn delete_matching(&self, query: &QueryDescriptor) -> SyncResult<u64> {
        self.post_json::<_, CountResponse>(Endpoint::DeleteMatching, query)
            .map(|r| r.count)
    }

    fn is_available(&self) -> bool {
        self.client.is_healthy()
    }
}

/// A loopback HTTP client that routes requests directly to a server
/// in the same process.
///
/// Useful for exercising the full wire path without network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_post(path, body)
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        // Extract path from URL
        let path = ["/objects/", "/query/"]
            .iter()
            .find_map(|prefix| url.find(prefix))
            .map(|i| &url[i..])
            .unwrap_or(url);

        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
