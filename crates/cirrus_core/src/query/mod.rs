//! Query construction.

mod builder;

pub use builder::{QueryBuilder, DEFAULT_LIMIT, MAX_SORT_KEYS};
