//! SQLite backing store for the embedding cache.
//!
//! Vectors are stored as JSON arrays alongside their dimension. Expired rows
//! read as misses and are purged on the next write.

use std::time::Duration;

use chrono::Utc;

use pulse_core::memory::cache::EmbeddingCacheStore;
use pulse_types::error::RepositoryError;

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

/// SQLite-backed implementation of `EmbeddingCacheStore`.
pub struct SqliteEmbeddingCacheStore {
    pool: DatabasePool,
}

impl SqliteEmbeddingCacheStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM embedding_cache WHERE expires_at <= ?")
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }
}

impl EmbeddingCacheStore for SqliteEmbeddingCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>, RepositoryError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT vector, dimension FROM embedding_cache WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(format_datetime(&Utc::now()))
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(query_error)?;

        let Some((json, dimension)) = row else {
            return Ok(None);
        };
        let vector: Vec<f32> = serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Query(format!("invalid cached vector: {e}")))?;
        if vector.len() as i64 != dimension {
            return Err(RepositoryError::Query(format!(
                "cached vector has {} values, row says {dimension}",
                vector.len()
            )));
        }
        Ok(Some(vector))
    }

    async fn put(&self, key: &str, vector: &[f32], ttl: Duration) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RepositoryError::Query(format!("invalid ttl: {e}")))?;
        let json = serde_json::to_string(vector)
            .map_err(|e| RepositoryError::Query(format!("failed to encode vector: {e}")))?;

        let purged = self.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired embedding cache entries");
        }

        sqlx::query(
            r#"INSERT INTO embedding_cache (key, vector, dimension, created_at, expires_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   vector = excluded.vector,
                   dimension = excluded.dimension,
                   created_at = excluded.created_at,
                   expires_at = excluded.expires_at"#,
        )
        .bind(key)
        .bind(json)
        .bind(vector.len() as i64)
        .bind(format_datetime(&now))
        .bind(format_datetime(&(now + ttl)))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}
