//! Loading producer work units into the queue.

use super::{Pipeline, UNBOUNDED_LOCK_TIMEOUT};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::TryStreamExt;
use sitemap_model::{ChunkStatus, Variant, WorkUnit};
use tracing::instrument;

impl Pipeline {
    /// Rebuild the queue from scratch for the given variants (all of them
    /// when `None`). Returns the number of items enqueued.
    ///
    /// Fails immediately with [`ErrorKind::LockUnavailable`] if another run
    /// is active. Clears the queue, any stash and all staged content first.
    /// A variant whose producers yield no work units at all has its content
    /// (staged and live) removed. If the rebuild fails part way, whatever was
    /// already enqueued is discarded again.
    #[instrument(skip(self))]
    pub async fn rebuild_queue(&self, variants: Option<&[String]>) -> Result<u64> {
        self.acquire_lock(UNBOUNDED_LOCK_TIMEOUT).await?;
        let result = self.rebuild_queue_inner(variants).await;
        // Never leave a partial queue behind.
        if result.is_err()
            && let Err(reset) = self.delete_queue_inner().await
        {
            tracing::error!(error = ?reset, "Could not discard partially rebuilt queue");
        }
        let released = self.release_lock().await;
        let enqueued = result?;
        released?;
        Ok(enqueued)
    }

    async fn rebuild_queue_inner(&self, variants: Option<&[String]>) -> Result<u64> {
        self.delete_queue_inner().await?;
        let variants: Vec<&Variant> = match variants {
            None => self.registry.variants().iter().collect(),
            Some(ids) => {
                // Processing order comes from the registry, not the caller.
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    selected.push(self.registry.variant(id)?);
                }
                self.registry.variants().iter().filter(|v| selected.iter().any(|s| s.id == v.id)).collect()
            },
        };

        let batch_size = self.options.queue_batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut enqueued = 0;
        let mut empty = Vec::new();
        for variant in variants {
            let sitemap_type = self.registry.sitemap_type(variant)?;
            let mut yielded = 0_u64;
            for producer_id in &sitemap_type.producers {
                let producer = self.registry.producer(producer_id)?;
                let mut data_sets = producer.data_sets(variant);
                while let Some(data) = data_sets.try_next().await.or_raise(|| ErrorKind::Producer(producer_id.clone()))? {
                    batch.push(WorkUnit::new(&variant.id, producer_id, data));
                    yielded += 1;
                    if batch.len() >= batch_size {
                        enqueued += self.enqueue(&mut batch).await?;
                    }
                }
            }
            tracing::debug!(variant = %variant.id, work_units = yielded, "Enumerated variant");
            if yielded == 0 {
                empty.push(variant.id.clone());
            }
        }
        if !batch.is_empty() {
            enqueued += self.enqueue(&mut batch).await?;
        }

        for variant in &empty {
            let deleted = self.stores.content.delete_content(variant).await.or_raise(|| ErrorKind::Content)?;
            tracing::info!(variant = %variant, chunks = deleted, "Removed content of variant without work units");
        }
        tracing::info!(enqueued, "Rebuilt queue");
        Ok(enqueued)
    }

    async fn enqueue(&self, batch: &mut Vec<WorkUnit>) -> Result<u64> {
        let added = self.stores.queue.enqueue(batch).await.or_raise(|| ErrorKind::Queue)?;
        batch.clear();
        let initial = self.initial_count().await?;
        self.set_initial_count(initial + added).await?;
        Ok(added)
    }

    /// Empty the queue, drop any stash, reset the counters and remove all
    /// staged (never published) content.
    pub async fn delete_queue(&self) -> Result<()> {
        self.acquire_lock(UNBOUNDED_LOCK_TIMEOUT).await?;
        let result = self.delete_queue_inner().await;
        let released = self.release_lock().await;
        result?;
        released
    }

    async fn delete_queue_inner(&self) -> Result<()> {
        self.stores.queue.clear().await.or_raise(|| ErrorKind::Queue)?;
        self.stores.content.purge(None, Some(ChunkStatus::Staged)).await.or_raise(|| ErrorKind::Content)?;
        self.set_initial_count(0).await?;
        self.delete_stash().await
    }
}
