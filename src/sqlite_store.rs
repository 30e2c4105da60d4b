//! SQLite-backed [`Store`] implementation.
//!
//! One table, `cache_entries`, keyed by `(container, key)`. A store instance
//! only ever touches rows of its own container, so `delete_all` clears the
//! checklist cache without affecting anything else in the file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use gptodo_core::store::Store;

use crate::config::CacheConfig;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
    container: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, container: impl Into<String>) -> Self {
        Self {
            pool,
            container: container.into(),
        }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        let pool = db::connect(&config.path)
            .await
            .with_context(|| format!("Failed to open cache at {}", config.path.display()))?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self::new(pool, config.container.clone()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (container, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(container, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.container)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE container = ? AND key = ?")
                .bind(&self.container)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE container = ? AND key = ?")
            .bind(&self.container)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE container = ?")
            .bind(&self.container)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
