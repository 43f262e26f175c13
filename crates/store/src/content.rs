//! Per-variant chunk storage with a staged and a live partition.
//!
//! Generation only ever appends to the staged partition. Readers only ever
//! look at the live partition. [`ContentStorage::publish`] swaps the two in a
//! single transaction so a reader sees either the complete previous live set
//! or the complete new one.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::ChunkRow;
use exn::ResultExt;
use sitemap_model::{Chunk, ChunkStatus, ContentStatus, INDEX_DELTA};
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

/// A rendered index document, ready to be stored at delta 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub document: String,
    /// Number of content chunks the index lists.
    pub link_count: u32,
}

/// Outcome of a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The staged partition replaced the live one.
    Published {
        /// Number of content chunks now live.
        chunks: u64,
    },
    /// Nothing was staged, so the live partition was left untouched.
    NothingStaged,
}

#[derive(Debug, Clone)]
pub struct ContentStorage {
    pool: SqlitePool,
}
impl From<&Database> for ContentStorage {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ContentStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Store a serialized document as the variant's next staged chunk.
    ///
    /// Returns the delta assigned to the chunk: one past the highest staged
    /// delta, or `1` if nothing is staged yet. Live chunks are never touched.
    #[instrument(skip(self, document), fields(variant = %variant))]
    pub async fn add_staged_chunk(&self, variant: &str, document: &str, link_count: u32) -> Result<u32> {
        let delta: i64 = sqlx::query_scalar(include_str!("../queries/chunk_insert_staged.sql"))
            .bind(variant)
            .bind(document)
            .bind(i64::from(link_count))
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let delta = u32::try_from(delta).or_raise(|| ErrorKind::InvalidData("chunk delta"))?;
        tracing::debug!(delta, link_count, "Staged chunk");
        Ok(delta)
    }

    /// Upsert the variant's index document in the given partition.
    pub async fn store_index(&self, variant: &str, status: ChunkStatus, index: &IndexDocument) -> Result<()> {
        sqlx::query(include_str!("../queries/chunk_upsert_index.sql"))
            .bind(variant)
            .bind(status.as_str())
            .bind(&index.document)
            .bind(i64::from(index.link_count))
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Replace the variant's live chunks with its staged chunks.
    ///
    /// Refused (returning [`Publish::NothingStaged`]) when no staged content
    /// chunk exists, so a working live sitemap is never replaced by nothing.
    /// When an index is supplied it is written as the new live delta 0 in the
    /// same transaction, so readers never see content without its index.
    #[instrument(skip(self, index), fields(variant = %variant, with_index = index.is_some()))]
    pub async fn publish(&self, variant: &str, index: Option<&IndexDocument>) -> Result<Publish> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let staged: i64 = sqlx::query_scalar(include_str!("../queries/chunk_count.sql"))
            .bind(variant)
            .bind(ChunkStatus::Staged.as_str())
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if staged == 0 {
            tx.rollback().await.or_raise(|| ErrorKind::Database)?;
            return Ok(Publish::NothingStaged);
        }
        sqlx::query(include_str!("../queries/chunk_delete_live.sql"))
            .bind(variant)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/chunk_promote_staged.sql"))
            .bind(variant)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(index) = index {
            sqlx::query(include_str!("../queries/chunk_upsert_index.sql"))
                .bind(variant)
                .bind(ChunkStatus::Live.as_str())
                .bind(&index.document)
                .bind(i64::from(index.link_count))
                .bind(UtcDateTime::now().unix_timestamp())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        let chunks = u64::try_from(staged).or_raise(|| ErrorKind::InvalidData("chunk count"))?;
        tracing::info!(chunks, "Published variant");
        Ok(Publish::Published { chunks })
    }

    /// Delete chunks, optionally scoped to some variants and/or one partition.
    ///
    /// `None` for `variants` means every variant; `None` for `status` means
    /// both partitions. Returns the number of chunks deleted.
    #[instrument(skip(self))]
    pub async fn purge(&self, variants: Option<&[String]>, status: Option<ChunkStatus>) -> Result<u64> {
        let status = status.map(|s| s.as_str());
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut deleted = 0;
        match variants {
            None => {
                deleted += sqlx::query(include_str!("../queries/chunk_purge.sql"))
                    .bind(None::<&str>)
                    .bind(status)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?
                    .rows_affected();
            },
            Some(variants) => {
                for variant in variants {
                    deleted += sqlx::query(include_str!("../queries/chunk_purge.sql"))
                        .bind(Some(variant.as_str()))
                        .bind(status)
                        .execute(&mut *tx)
                        .await
                        .or_raise(|| ErrorKind::Database)?
                        .rows_affected();
                }
            },
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }

    /// Delete all of a variant's content, staged and live.
    pub async fn delete_content(&self, variant: &str) -> Result<u64> {
        self.purge(Some(&[variant.to_string()]), None).await
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Get one content chunk.
    ///
    /// Delta 0 is reserved for the index, use [`index`](Self::index) instead.
    pub async fn chunk(&self, variant: &str, status: ChunkStatus, delta: u32) -> Result<Option<Chunk>> {
        if delta == INDEX_DELTA {
            exn::bail!(ErrorKind::ReservedDelta(delta));
        }
        self.fetch(variant, status, delta).await
    }

    /// Get the variant's index document, if it has one.
    pub async fn index(&self, variant: &str, status: ChunkStatus) -> Result<Option<Chunk>> {
        self.fetch(variant, status, INDEX_DELTA).await
    }

    /// The document a reader should be served.
    ///
    /// With a delta, that content chunk. Without one, the index if the
    /// variant has one, otherwise its first (and only) content chunk.
    pub async fn document(&self, variant: &str, status: ChunkStatus, delta: Option<u32>) -> Result<Option<Chunk>> {
        match delta {
            Some(delta) => self.chunk(variant, status, delta).await,
            None => match self.index(variant, status).await? {
                Some(index) => Ok(Some(index)),
                None => self.fetch(variant, status, 1).await,
            },
        }
    }

    /// All content chunks of a partition, ordered by delta.
    pub async fn chunks(&self, variant: &str, status: ChunkStatus) -> Result<Vec<Chunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(include_str!("../queries/chunk_list.sql"))
            .bind(variant)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Chunk::try_from).collect()
    }

    /// Number of content chunks (the index excluded) in a partition.
    pub async fn chunk_count(&self, variant: &str, status: ChunkStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/chunk_count.sql"))
            .bind(variant)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("chunk count"))
    }

    /// Total number of links across the content chunks of a partition.
    pub async fn link_count(&self, variant: &str, status: ChunkStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/chunk_link_count.sql"))
            .bind(variant)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("link count"))
    }

    /// Creation time of the document readers are served by default.
    pub async fn created(&self, variant: &str, status: ChunkStatus) -> Result<Option<UtcDateTime>> {
        Ok(self.document(variant, status, None).await?.map(|chunk| chunk.created_at))
    }

    /// Whether a partition holds an index document.
    pub async fn has_index(&self, variant: &str, status: ChunkStatus) -> Result<bool> {
        Ok(self.index(variant, status).await?.is_some())
    }

    /// Publication state derived from which partitions hold chunks.
    pub async fn status(&self, variant: &str) -> Result<ContentStatus> {
        let (has_staged, has_live): (i64, i64) = sqlx::query_as(include_str!("../queries/chunk_partitions.sql"))
            .bind(variant)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(ContentStatus::from_partitions(has_staged != 0, has_live != 0))
    }

    async fn fetch(&self, variant: &str, status: ChunkStatus, delta: u32) -> Result<Option<Chunk>> {
        let row: Option<ChunkRow> = sqlx::query_as(include_str!("../queries/chunk_get.sql"))
            .bind(variant)
            .bind(status.as_str())
            .bind(i64::from(delta))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Chunk::try_from).transpose()
    }
}
