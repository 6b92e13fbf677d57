//! TTL cache for raw provider responses, backed by SQLite.
//!
//! One store instance is constructed per process and handed to every
//! gateway; entries are shared across jobs because the key is derived from
//! request identity alone. Concurrent writers for the same key are fine:
//! responses within a TTL window are fungible, so last-write-wins.

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::cache::key::CacheKey;

#[derive(Clone)]
pub struct ApiCache {
    pool: SqlitePool,
}

impl ApiCache {
    pub fn new(pool: SqlitePool) -> Self {
        ApiCache { pool }
    }

    /// Look up a cached response. Expired entries read as absent; the stale
    /// row is left for `evict_expired` or the next put.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, sqlx::Error> {
        let now = Utc::now().timestamp_millis();
        let row = sqlx::query(
            "SELECT response_data FROM api_cache WHERE cache_key = ? AND expires_at > ?",
        )
        .bind(key.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("response_data");
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("cache hit: {}", key);
                Ok(Some(value))
            }
            // An unreadable entry is as good as absent; the caller will
            // re-fetch and overwrite it.
            Err(_) => Ok(None),
        }
    }

    /// Store a validated response under the key with the given TTL.
    pub async fn put(
        &self,
        key: &CacheKey,
        response: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        let expires_at = now + ttl;

        sqlx::query(
            r#"
            INSERT INTO api_cache (cache_key, api_type, request_params, response_data, fetched_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                request_params = excluded.request_params,
                response_data = excluded.response_data,
                fetched_at = excluded.fetched_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key.as_str())
        .bind(key.api_type().as_str())
        .bind(key.params_json())
        .bind(response.to_string())
        .bind(now.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete entries whose TTL has passed. Returns the number removed.
    pub async fn evict_expired(&self) -> Result<u64, sqlx::Error> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("DELETE FROM api_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
