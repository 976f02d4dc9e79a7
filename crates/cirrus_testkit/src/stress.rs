//! Stress helpers for the engine and the object cache.
//!
//! These run many operations from several threads against one engine and
//! tally what the engine acknowledged.

use cirrus_core::{CloudObject, SharedObject};
use cirrus_sync_engine::{SyncEngine, SyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Tally of a concurrent save run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaveTally {
    /// Saves the engine acknowledged.
    pub saved: usize,
    /// Saves that returned an error or whose thread panicked.
    pub rejected: usize,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl SaveTally {
    /// Saves attempted.
    pub fn attempted(&self) -> usize {
        self.saved + self.rejected
    }

    /// Acknowledged saves per second, zero for an instant run.
    pub fn saves_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.saved as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Class the objects are saved under.
    pub class_name: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            class_name: "stress".to_string(),
        }
    }
}

/// Saves `threads * operations` new objects concurrently, each thread
/// through its own clone of the engine.
///
/// Every object carries `thread` and `seq` so callers can check that no
/// row was lost or merged.
pub fn stress_concurrent_saves(engine: &SyncEngine, config: &StressConfig) -> SaveTally {
    let saved = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = engine.clone();
            let saved = Arc::clone(&saved);
            let rejected = Arc::clone(&rejected);
            let class_name = config.class_name.clone();
            let operations = config.operations;

            thread::spawn(move || {
                for i in 0..operations {
                    let result = CloudObject::create(&class_name)
                        .and_then(|mut object| {
                            object.set("thread", t as i64)?;
                            object.set("seq", i as i64)?;
                            Ok(object)
                        })
                        .map_err(SyncError::from)
                        .and_then(|mut object| engine.save(&mut object));

                    match result {
                        Ok(()) => saved.fetch_add(1, Ordering::Relaxed),
                        Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            rejected.fetch_add(config.operations, Ordering::Relaxed);
        }
    }

    SaveTally {
        saved: saved.load(Ordering::Relaxed),
        rejected: rejected.load(Ordering::Relaxed),
        elapsed: start.elapsed(),
    }
}

/// Requests the same cached reference from many threads at once.
///
/// Returns every handle obtained; with caching on they must all be the
/// same instance.
pub fn stress_concurrent_references(
    engine: &SyncEngine,
    class_name: &str,
    object_id: &str,
    config: &StressConfig,
) -> Vec<SharedObject> {
    thread::scope(|s| {
        let workers: Vec<_> = (0..config.threads)
            .map(|_| {
                s.spawn(|| {
                    (0..config.operations)
                        .filter_map(|_| engine.reference(class_name, object_id, true).ok())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        workers
            .into_iter()
            .filter_map(|w| w.join().ok())
            .flatten()
            .collect()
    })
}
