//! SQLite-backed pattern store.
//!
//! Structured fields (keywords, example queries, the cached response) are
//! serialized as JSON columns. Counter updates run as single SQL statements
//! under the connection lock, so concurrent hits on the same pattern never
//! lose increments.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode as SqliteErrorCode, OptionalExtension};

use reflex_core::error::{ReflexError, ReflexResult};
use reflex_core::traits::{PatternStore, SuccessRateUpdate};
use reflex_core::types::{CachedResponse, ExampleQuery, Pattern};

/// SQLite-backed pattern store.
pub struct SqlitePatternStore {
    conn: Mutex<Connection>,
}

impl SqlitePatternStore {
    /// Create a new store at the given path.
    pub fn new(path: impl AsRef<Path>) -> ReflexResult<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> ReflexResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> ReflexResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                keywords TEXT NOT NULL,
                example_queries TEXT NOT NULL,
                cached_response TEXT NOT NULL,
                domain TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                hit_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_namespace_active
                ON patterns(namespace, is_active);
        "#,
        )
        .map_err(db_err)?;
        tracing::debug!("pattern store schema ready");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn row_to_pattern(row: &rusqlite::Row<'_>) -> ReflexResult<Pattern> {
        let keywords: String = row.get(3).map_err(db_err)?;
        let example_queries: String = row.get(4).map_err(db_err)?;
        let cached_response: String = row.get(5).map_err(db_err)?;
        let created_at: String = row.get(12).map_err(db_err)?;
        let updated_at: String = row.get(13).map_err(db_err)?;

        Ok(Pattern {
            id: row.get(0).map_err(db_err)?,
            namespace: row.get(1).map_err(db_err)?,
            key: row.get(2).map_err(db_err)?,
            keywords: serde_json::from_str::<Vec<String>>(&keywords)?,
            example_queries: serde_json::from_str::<Vec<ExampleQuery>>(&example_queries)?,
            cached_response: serde_json::from_str::<CachedResponse>(&cached_response)?,
            domain: row.get(6).map_err(db_err)?,
            is_active: row.get::<_, i64>(7).map_err(db_err)? != 0,
            hit_count: row.get::<_, i64>(8).map_err(db_err)? as u64,
            success_count: row.get::<_, i64>(9).map_err(db_err)? as u64,
            sample_count: row.get::<_, i64>(10).map_err(db_err)? as u64,
            confidence: row.get::<_, f64>(11).map_err(db_err)? as f32,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

const PATTERN_COLUMNS: &str = "id, namespace, key, keywords, example_queries, cached_response, \
     domain, is_active, hit_count, success_count, sample_count, confidence, \
     created_at, updated_at";

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn get_active_patterns(&self, namespace: &str) -> ReflexResult<Vec<Pattern>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PATTERN_COLUMNS} FROM patterns \
                 WHERE namespace = ?1 AND is_active = 1 \
                 ORDER BY created_at ASC, id ASC"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![namespace], |row| Ok(Self::row_to_pattern(row)))
            .map_err(db_err)?;

        let mut patterns = Vec::new();
        for row in rows {
            patterns.push(row.map_err(db_err)??);
        }
        Ok(patterns)
    }

    async fn get_pattern(&self, id: &str) -> ReflexResult<Option<Pattern>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?1"
            ))
            .map_err(db_err)?;

        stmt.query_row(params![id], |row| Ok(Self::row_to_pattern(row)))
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    async fn create_pattern(&self, pattern: &Pattern) -> ReflexResult<String> {
        let keywords = serde_json::to_string(&pattern.keywords)?;
        let example_queries = serde_json::to_string(&pattern.example_queries)?;
        let cached_response = serde_json::to_string(&pattern.cached_response)?;

        let conn = self.lock();
        let result = conn.execute(
            r#"INSERT INTO patterns
               (id, namespace, key, keywords, example_queries, cached_response,
                domain, is_active, hit_count, success_count, sample_count, confidence,
                created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            params![
                pattern.id,
                pattern.namespace,
                pattern.key,
                keywords,
                example_queries,
                cached_response,
                pattern.domain,
                pattern.is_active as i64,
                pattern.hit_count as i64,
                pattern.success_count as i64,
                pattern.sample_count as i64,
                f64::from(pattern.confidence),
                pattern.created_at.to_rfc3339(),
                pattern.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(pattern.id.clone()),
            Err(e) if is_unique_violation(&e) => Err(ReflexError::store_conflict(format!(
                "pattern key '{}' exists in namespace '{}'",
                pattern.key, pattern.namespace
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn increment_hit_count(&self, id: &str) -> ReflexResult<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE patterns SET hit_count = hit_count + 1, updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ReflexError::not_found(id));
        }
        Ok(())
    }

    async fn update_success_rate(
        &self,
        id: &str,
        success: bool,
    ) -> ReflexResult<SuccessRateUpdate> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE patterns SET \
                   success_count = success_count + ?2, \
                   sample_count = sample_count + 1, \
                   updated_at = ?3 \
                 WHERE id = ?1",
                params![id, success as i64, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ReflexError::not_found(id));
        }

        let (success_count, sample_count): (i64, i64) = conn
            .query_row(
                "SELECT success_count, sample_count FROM patterns WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;

        Ok(SuccessRateUpdate {
            success_rate: if sample_count == 0 {
                1.0
            } else {
                success_count as f32 / sample_count as f32
            },
            sample_count: sample_count as u64,
        })
    }

    async fn append_example_query(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
    ) -> ReflexResult<()> {
        let conn = self.lock();
        let stored: String = conn
            .query_row(
                "SELECT example_queries FROM patterns WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| ReflexError::not_found(id))?;

        let mut examples: Vec<ExampleQuery> = serde_json::from_str(&stored)?;
        examples.push(ExampleQuery::new(text, embedding.to_vec()));
        let serialized = serde_json::to_string(&examples)?;

        conn.execute(
            "UPDATE patterns SET example_queries = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serialized, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn deactivate(&self, id: &str) -> ReflexResult<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE patterns SET is_active = 0, updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ReflexError::not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> ReflexResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM patterns WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: rusqlite::Error) -> ReflexError {
    ReflexError::store(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == SqliteErrorCode::ConstraintViolation
    )
}

fn parse_timestamp(value: &str) -> ReflexResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReflexError::parse(e.to_string()))
}
