//! # Cirrus Testkit
//!
//! Test utilities for Cirrus.
//!
//! This crate provides:
//! - Backend fixtures wiring an engine to an in-process store
//! - Seed data sets for query tests
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cirrus_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_backend() {
//!     with_backend(|backend| {
//!         seed_scores(backend, &SCORES);
//!         let query = backend.query("game").unwrap();
//!         assert_eq!(backend.count(&query), 5);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
