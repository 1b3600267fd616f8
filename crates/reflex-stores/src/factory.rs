//! Factory for creating pattern stores.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use reflex_core::error::ReflexResult;
use reflex_core::traits::PatternStore;

use crate::sqlite::SqlitePatternStore;

/// Pattern store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternStoreProvider {
    #[default]
    Sqlite,
}

/// Pattern store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternStoreConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: PatternStoreProvider,
    /// Database path. `None` means in-memory (tests, ephemeral deployments).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<std::path::PathBuf>,
}

/// Factory for creating pattern stores.
pub struct PatternStoreFactory;

impl PatternStoreFactory {
    /// Create a store from the given configuration.
    pub fn create(config: &PatternStoreConfig) -> ReflexResult<Arc<dyn PatternStore>> {
        match config.provider {
            PatternStoreProvider::Sqlite => {
                let store = match &config.path {
                    Some(path) => SqlitePatternStore::new(path)?,
                    None => SqlitePatternStore::in_memory()?,
                };
                Ok(Arc::new(store))
            }
        }
    }

    /// Create an on-disk SQLite store.
    pub fn sqlite(path: impl Into<std::path::PathBuf>) -> ReflexResult<Arc<dyn PatternStore>> {
        Self::create(&PatternStoreConfig {
            provider: PatternStoreProvider::Sqlite,
            path: Some(path.into()),
        })
    }

    /// Create an in-memory SQLite store.
    pub fn in_memory() -> ReflexResult<Arc<dyn PatternStore>> {
        Self::create(&PatternStoreConfig::default())
    }
}
