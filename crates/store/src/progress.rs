//! Small durable key/value store for run counters and the stash blob.

use crate::Database;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use sqlx::SqlitePool;

/// Durable JSON values keyed by name.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or overwrite.
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Deleting a key that doesn't exist is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteProgress {
    pool: SqlitePool,
}
impl From<&Database> for SqliteProgress {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgress {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar(include_str!("../queries/state_get.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        raw.map(|raw| serde_json::from_str(&raw).or_raise(|| ErrorKind::InvalidData("state value")))
            .transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("state value"))?;
        sqlx::query(include_str!("../queries/state_set.sql"))
            .bind(key)
            .bind(raw)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/state_delete.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
