//! Named mutual-exclusion leases that expire on their own.

use crate::error::{ErrorKind, Result};
use crate::{Database, now_millis};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::instrument;

static INSTANCES: AtomicU64 = AtomicU64::new(0);

/// Named leases with a timeout.
///
/// A lease that is never released stops blocking other owners once its
/// timeout has passed, so a killed process cannot wedge the system.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take (or extend) the named lease for `timeout`.
    ///
    /// Returns `false` without waiting if someone else holds an unexpired
    /// lease. Re-acquiring a lease this service already holds extends it.
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<bool>;

    /// Release the named lease if this service holds it.
    async fn release(&self, name: &str) -> Result<()>;

    /// `true` if nobody currently holds an unexpired lease on `name`.
    async fn may_be_available(&self, name: &str) -> Result<bool>;
}

/// [`LockService`] backed by the `sitemap_locks` table.
///
/// Every instance is a distinct owner: two `SqliteLock`s over the same
/// database exclude each other even inside one process.
#[derive(Debug, Clone)]
pub struct SqliteLock {
    pool: SqlitePool,
    owner: String,
}
impl From<&Database> for SqliteLock {
    fn from(db: &Database) -> Self {
        let instance = INSTANCES.fetch_add(1, Ordering::Relaxed);
        let owner = format!("{}-{}-{instance}", std::process::id(), now_millis());
        Self { pool: db.pool().clone(), owner }
    }
}
impl SqliteLock {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl LockService for SqliteLock {
    #[instrument(skip(self), fields(owner = %self.owner))]
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<bool> {
        let now = now_millis();
        let timeout = i64::try_from(timeout.as_millis()).or_raise(|| ErrorKind::InvalidData("lock timeout"))?;
        let affected = sqlx::query(include_str!("../queries/lock_acquire.sql"))
            .bind(name)
            .bind(&self.owner)
            .bind(now.saturating_add(timeout))
            .bind(now)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        let acquired = affected == 1;
        tracing::debug!(acquired, "Lock acquisition attempted");
        Ok(acquired)
    }

    async fn release(&self, name: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/lock_release.sql"))
            .bind(name)
            .bind(&self.owner)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn may_be_available(&self, name: &str) -> Result<bool> {
        let held: i64 = sqlx::query_scalar(include_str!("../queries/lock_held.sql"))
            .bind(name)
            .bind(now_millis())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(held == 0)
    }
}
