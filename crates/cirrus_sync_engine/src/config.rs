//! Client configuration.

use cirrus_core::DEFAULT_LIMIT;
use std::time::Duration;

/// Credentials and service settings for one application.
///
/// Passed explicitly to [`SyncEngine`](crate::SyncEngine); several
/// independent configurations can coexist in one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Application key sent with every request.
    pub app_key: String,
    /// Master key, granting unrestricted access when present.
    pub master_key: Option<String>,
    /// Service base URL.
    pub base_url: String,
    /// Transport timeout. Enforcing it is up to the `HttpClient`.
    pub timeout: Duration,
    /// Limit of queries created through the engine.
    pub default_query_limit: u32,
}

impl ClientConfig {
    /// Creates a configuration for `app_key` with default settings.
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            master_key: None,
            base_url: "https://api.cirrus.cloud/1".to_string(),
            timeout: Duration::from_secs(30),
            default_query_limit: DEFAULT_LIMIT,
        }
    }

    /// Sets the master key.
    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Sets the service base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default query limit.
    pub fn with_default_query_limit(mut self, limit: u32) -> Self {
        self.default_query_limit = limit;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}
