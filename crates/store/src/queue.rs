//! Durable FIFO of work units.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::QueueRow;
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use futures::Stream;
use sitemap_model::{QueueItem, WorkUnit};
use sqlx::SqlitePool;
use std::pin::Pin;
use time::UtcDateTime;

pub type QueueItemStream<'a> = Pin<Box<dyn Stream<Item = Result<QueueItem>> + Send + 'a>>;

/// Rows fetched per round trip while iterating the queue.
const PAGE_SIZE: i64 = 100;

/// A durable FIFO of [`WorkUnit`]s.
///
/// Items are handed out in insertion order and stay in the queue until they
/// are explicitly [deleted](Self::delete); iterating never removes anything.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a batch of work units. Returns the number of items added.
    async fn enqueue(&self, units: &[WorkUnit]) -> Result<u64>;

    /// Stream every item currently in the queue, oldest first.
    ///
    /// Deleting an item that has already been yielded does not disturb the
    /// iteration. An item that can't be decoded is yielded as
    /// [`ErrorKind::InvalidPayload`] and iteration continues past it.
    fn items<'a>(&'a self) -> QueueItemStream<'a>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Remove every item.
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}
impl From<&Database> for SqliteQueue {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl QueueStore for SqliteQueue {
    async fn enqueue(&self, units: &[WorkUnit]) -> Result<u64> {
        let created_at = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for unit in units {
            let payload = serde_json::to_string(unit).or_raise(|| ErrorKind::InvalidData("queue payload"))?;
            sqlx::query(include_str!("../queries/queue_insert.sql"))
                .bind(payload)
                .bind(created_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(units.len() as u64)
    }

    fn items<'a>(&'a self) -> QueueItemStream<'a> {
        Box::pin(stream! {
            let mut after = 0_i64;
            loop {
                let page: Vec<QueueRow> = match sqlx::query_as(include_str!("../queries/queue_page.sql"))
                    .bind(after)
                    .bind(PAGE_SIZE)
                    .fetch_all(&self.pool)
                    .await
                    .or_raise(|| ErrorKind::Database)
                {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                if page.is_empty() {
                    break;
                }
                for row in page {
                    after = row.item_id;
                    yield QueueItem::try_from(row);
                }
            }
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/queue_delete.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/queue_count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("queue count"))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(include_str!("../queries/queue_clear.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
