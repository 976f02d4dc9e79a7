//! Test fixtures and backend helpers.
//!
//! Provides convenience functions for wiring an engine to an in-process
//! store and seeding common data sets.

use cirrus_codec::GeoPoint;
use cirrus_core::CloudObject;
use cirrus_sync_engine::{ClientConfig, HttpTransport, LoopbackClient, MemoryStore, SyncEngine};
use std::sync::Arc;

/// Application key every fixture is configured with.
pub const TEST_APP_KEY: &str = "test-app";

/// Scores seeded into the `game` class by [`seed_scores`].
pub const SCORES: [i32; 5] = [5, 10, 15, 20, 25];

/// Center of the `shop` data set seeded by [`seed_shops`].
pub const SHOP_CENTER: (f64, f64) = (48.8566, 2.3522);

/// Shop locations around [`SHOP_CENTER`]; all but one lie within 1 km.
pub const SHOP_LOCATIONS: [(f64, f64); 5] = [
    (48.8566, 2.3522),
    (48.8570, 2.3530),
    (48.8580, 2.3480),
    (48.8600, 2.3600),
    (48.9000, 2.4000),
];

/// An engine paired with the store behind it.
pub struct TestBackend {
    /// The engine under test.
    pub engine: SyncEngine,
    /// The store, for direct inspection and toggling availability.
    pub store: Arc<MemoryStore>,
}

impl TestBackend {
    /// Creates an engine that calls the store directly.
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::with_app_key(TEST_APP_KEY));
        let engine = SyncEngine::new(ClientConfig::new(TEST_APP_KEY), Arc::clone(&store));
        Self { engine, store }
    }

    /// Creates an engine that reaches the store through the JSON wire path.
    pub fn wired() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::with_app_key(TEST_APP_KEY));
        let config = ClientConfig::new(TEST_APP_KEY).with_base_url("http://loopback/1");
        let transport = HttpTransport::new(config.clone(), LoopbackClient::new(Arc::clone(&store)));
        let engine = SyncEngine::new(config, transport);
        Self { engine, store }
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestBackend {
    type Target = SyncEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Saves one `game` object per score and returns them.
pub fn seed_scores(engine: &SyncEngine, scores: &[i32]) -> Vec<CloudObject> {
    scores
        .iter()
        .map(|&score| {
            let mut object = CloudObject::create("game").expect("valid class");
            object.set("score", score).expect("valid key");
            engine.save(&mut object).expect("Failed to seed score");
            object
        })
        .collect()
}

/// Saves one `shop` object per entry of [`SHOP_LOCATIONS`] under key `loc`.
pub fn seed_shops(engine: &SyncEngine) -> Vec<CloudObject> {
    SHOP_LOCATIONS
        .iter()
        .enumerate()
        .map(|(i, &(lat, lng))| {
            let mut shop = CloudObject::create("shop").expect("valid class");
            shop.set("loc", GeoPoint::new(lat, lng).expect("valid point"))
                .expect("valid key");
            shop.set("name", format!("shop{i}")).expect("valid key");
            engine.save(&mut shop).expect("Failed to seed shop");
            shop
        })
        .collect()
}

/// Returns [`SHOP_CENTER`] as a point.
pub fn shop_center() -> GeoPoint {
    GeoPoint::new(SHOP_CENTER.0, SHOP_CENTER.1).expect("valid point")
}

/// Runs a test against a fresh direct backend.
///
/// # Example
///
/// ```rust,ignore
/// use cirrus_testkit::with_backend;
///
/// #[test]
/// fn my_test() {
///     with_backend(|backend| {
///         let query = backend.query("game").unwrap();
///         assert_eq!(backend.count(&query), 0);
///     });
/// }
/// ```
pub fn with_backend<F, R>(f: F) -> R
where
    F: FnOnce(&TestBackend) -> R,
{
    let backend = TestBackend::new();
    f(&backend)
}

/// Installs a test-writer tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
