//! reflex-stores - Pattern store implementations for reflex.
//!
//! Currently ships a SQLite store suitable for single-node deployments and
//! tests; the [`reflex_core::traits::PatternStore`] trait is the seam for
//! network-backed stores.

mod factory;
pub mod sqlite;

pub use factory::{PatternStoreConfig, PatternStoreFactory, PatternStoreProvider};
pub use sqlite::SqlitePatternStore;
