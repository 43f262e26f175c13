//! Time-boxed queue draining, chunking and publishing.

use super::{GenerateOutcome, LOCK_MARGIN, Pipeline, UNBOUNDED_LOCK_TIMEOUT};
use crate::error::{ErrorKind, Result};
use crate::producer::error::ErrorKind as ProducerErrorKind;
use exn::ResultExt;
use futures::StreamExt;
use sitemap_model::{Chunk, ChunkStatus, StashedState, UrlRecord, Variant, WorkUnit};
use sitemap_render::{IndexEntry, RenderContext};
use sitemap_store::error::ErrorKind as StoreErrorKind;
use sitemap_store::{IndexDocument, Publish};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::instrument;

impl Pipeline {
    /// One generation pass using the configured time budget and chunk size.
    pub async fn run(&self) -> Result<GenerateOutcome> {
        self.generate(self.options.time_budget, self.options.max_links).await
    }

    /// Drain the queue until it is empty or `budget` has elapsed.
    ///
    /// Resumes from the stash left by a previous suspended pass. When there
    /// is neither a stash nor anything queued, the queue is rebuilt for all
    /// variants first. Fails immediately with [`ErrorKind::LockUnavailable`]
    /// if another run is active.
    ///
    /// `None` for `budget` means unbounded; `None` for `max_links` writes
    /// each variant as a single chunk.
    #[instrument(skip(self))]
    pub async fn generate(&self, budget: Option<Duration>, max_links: Option<usize>) -> Result<GenerateOutcome> {
        let started = Instant::now();
        let max_links = max_links.filter(|max| *max > 0);
        if self.load_stash().await?.is_none() && self.stores.queue.count().await.or_raise(|| ErrorKind::Queue)? == 0 {
            tracing::info!("Nothing queued, rebuilding queue for all variants");
            self.rebuild_queue(None).await?;
        }

        let lock_timeout = budget.map_or(UNBOUNDED_LOCK_TIMEOUT, |budget| budget + LOCK_MARGIN);
        self.acquire_lock(lock_timeout).await?;
        // Read once the lease is held so a concurrent pass can't have
        // replaced it in between.
        let mut state = match self.load_stash().await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                self.release_lock().await?;
                return Err(e);
            },
        };
        if state.variant.is_some() {
            tracing::info!(variant = ?state.variant, records = state.record_count(), "Resuming from stash");
        }

        match self.generate_locked(&mut state, started, budget, max_links).await {
            Ok(outcome) => {
                self.release_lock().await?;
                Ok(outcome)
            },
            Err(e) => {
                // Keep whatever made it this far so the next pass can carry on.
                if let Err(stash_error) = self.save_stash(&state).await {
                    tracing::error!(error = ?stash_error, "Could not stash state after a failed pass");
                }
                if let Err(release_error) = self.release_lock().await {
                    tracing::error!(error = ?release_error, "Could not release lock after a failed pass");
                }
                Err(e)
            },
        }
    }

    async fn generate_locked(
        &self,
        state: &mut StashedState,
        started: Instant,
        budget: Option<Duration>,
        max_links: Option<usize>,
    ) -> Result<GenerateOutcome> {
        let mut items = self.stores.queue.items();
        while let Some(item) = items.next().await {
            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                break;
            }
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    if let StoreErrorKind::InvalidPayload(id) = *e {
                        tracing::warn!(item = id, error = ?e, "Dropping undecodable queue item");
                        self.stores.queue.delete(id).await.or_raise(|| ErrorKind::Queue)?;
                        continue;
                    }
                    return Err(e).or_raise(|| ErrorKind::Queue);
                },
            };
            self.process_item(state, &item.unit, max_links).await?;
            self.stores.queue.delete(item.id).await.or_raise(|| ErrorKind::Queue)?;
        }
        drop(items);

        let remaining = self.stores.queue.count().await.or_raise(|| ErrorKind::Queue)?;
        if remaining > 0 {
            self.save_stash(state).await?;
            tracing::info!(remaining, records = state.record_count(), "Time budget exhausted, generation suspended");
            return Ok(GenerateOutcome::Suspended { remaining });
        }
        self.finish_variant(state, max_links).await?;
        self.delete_stash().await?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Generation completed");
        Ok(GenerateOutcome::Completed)
    }

    /// Handle one queue item. Failures confined to the item are logged and
    /// swallowed; storage failures are returned.
    async fn process_item(&self, state: &mut StashedState, unit: &WorkUnit, max_links: Option<usize>) -> Result<()> {
        let variant = match self.registry.variant(&unit.variant_id) {
            Ok(variant) => variant,
            Err(e) => {
                tracing::warn!(error = ?e, "Dropping queue item for unknown variant");
                return Ok(());
            },
        };
        if state.variant.as_deref() != Some(variant.id.as_str()) {
            self.finish_variant(state, max_links).await?;
            state.variant = Some(variant.id.clone());
            state.seen_keys.clear();
        }

        match self.produce(variant, unit).await {
            Ok(records) => {
                let records = self.deduplicate(state, records);
                state.unflushed.extend(records);
            },
            Err(e) if matches!(&*e, ProducerErrorKind::Skip) => {
                tracing::debug!(producer = %unit.producer_id, "Work unit skipped");
            },
            Err(e) => {
                tracing::warn!(variant = %variant.id, producer = %unit.producer_id, error = ?e, "Work unit failed");
            },
        }

        if max_links.is_some_and(|max| state.record_count() >= max) {
            self.flush(variant, state, max_links, false).await?;
        }
        Ok(())
    }

    async fn produce(&self, variant: &Variant, unit: &WorkUnit) -> crate::producer::error::Result<Vec<UrlRecord>> {
        let producer = self.registry.producer(&unit.producer_id).or_raise(|| ProducerErrorKind::Failed)?;
        producer.generate(variant, &unit.data).await
    }

    /// Drop records whose dedup key was already emitted in this variant pass.
    fn deduplicate(&self, state: &mut StashedState, records: Vec<UrlRecord>) -> Vec<UrlRecord> {
        if !self.options.remove_duplicates {
            return records;
        }
        let before = records.len();
        let kept: Vec<UrlRecord> = records
            .into_iter()
            .filter(|record| match &record.dedup_key {
                Some(key) => state.seen_keys.insert(key.clone()),
                None => true,
            })
            .collect();
        if kept.len() < before {
            tracing::debug!(dropped = before - kept.len(), "Removed duplicate records");
        }
        kept
    }

    /// Write the current variant's remaining records and publish it.
    ///
    /// A stashed variant that has since been removed from the registry can
    /// be neither serialized nor published, so its records are discarded.
    async fn finish_variant(&self, state: &mut StashedState, max_links: Option<usize>) -> Result<()> {
        let Some(id) = state.variant.clone() else {
            return Ok(());
        };
        match self.registry.variant(&id) {
            Ok(variant) => {
                self.flush(variant, state, max_links, true).await?;
                self.publish(variant).await?;
            },
            Err(e) => {
                tracing::warn!(error = ?e, records = state.record_count(), "Discarding records of unknown variant");
                state.unflushed.clear();
                state.accumulated.clear();
            },
        }
        Ok(())
    }

    /// Move unflushed records through the link hooks, then write every full
    /// chunk. With `complete`, a trailing partial chunk is written too.
    ///
    /// Records leave the state only once the chunk holding them is stored.
    async fn flush(
        &self,
        variant: &Variant,
        state: &mut StashedState,
        max_links: Option<usize>,
        complete: bool,
    ) -> Result<()> {
        if !state.unflushed.is_empty() {
            let mut processed = std::mem::take(&mut state.unflushed);
            for hook in &self.hooks {
                hook.alter(variant, &mut processed);
            }
            state.accumulated.append(&mut processed);
        }
        match max_links {
            Some(max) => {
                while state.accumulated.len() >= max || (complete && !state.accumulated.is_empty()) {
                    let size = max.min(state.accumulated.len());
                    self.write_chunk(variant, &state.accumulated[..size]).await?;
                    state.accumulated.drain(..size);
                }
            },
            None if complete && !state.accumulated.is_empty() => {
                self.write_chunk(variant, &state.accumulated).await?;
                state.accumulated.clear();
            },
            None => {},
        }
        Ok(())
    }

    async fn write_chunk(&self, variant: &Variant, links: &[UrlRecord]) -> Result<u32> {
        let serializer = self.registry.serializer(variant)?;
        let document = serializer.chunk_document(&self.render_context(variant), links).or_raise(|| ErrorKind::Serializer)?;
        let link_count = u32::try_from(links.len()).unwrap_or(u32::MAX);
        self.stores
            .content
            .add_staged_chunk(&variant.id, &document, link_count)
            .await
            .or_raise(|| ErrorKind::Content)
    }

    /// Swap the variant's staged chunks live, together with a fresh index
    /// when there is more than one chunk.
    #[instrument(skip(self, variant), fields(variant = %variant.id))]
    async fn publish(&self, variant: &Variant) -> Result<()> {
        let staged = self.stores.content.chunks(&variant.id, ChunkStatus::Staged).await.or_raise(|| ErrorKind::Content)?;
        let index = match staged.len() {
            0 | 1 => None,
            _ => Some(self.build_index(variant, &staged)?),
        };
        match self.stores.content.publish(&variant.id, index.as_ref()).await.or_raise(|| ErrorKind::Content)? {
            Publish::Published { chunks } => tracing::debug!(chunks, "Variant published"),
            Publish::NothingStaged => tracing::warn!("Nothing staged, keeping currently published content"),
        }
        Ok(())
    }

    /// Render an index over the given content chunks.
    fn build_index(&self, variant: &Variant, chunks: &[Chunk]) -> Result<IndexDocument> {
        let is_default = variant.id == self.options.default_variant;
        let entries = chunks
            .iter()
            .map(|chunk| -> Result<IndexEntry> {
                let url = self
                    .urls
                    .generate(&self.options.base_url, &variant.id, chunk.delta, is_default)
                    .or_raise(|| ErrorKind::Template)?;
                let last_modified = OffsetDateTime::from_unix_timestamp(chunk.created_at.unix_timestamp()).ok();
                Ok(IndexEntry { url, last_modified })
            })
            .collect::<Result<Vec<_>>>()?;
        let document = self
            .registry
            .serializer(variant)?
            .index_document(&self.render_context(variant), &entries)
            .or_raise(|| ErrorKind::Serializer)?;
        Ok(IndexDocument { document, link_count: u32::try_from(entries.len()).unwrap_or(u32::MAX) })
    }

    /// Regenerate and store the index document of one partition of a
    /// variant's content. Returns `false` (and stores nothing) when the
    /// partition holds fewer than two content chunks.
    pub async fn rebuild_index(&self, variant_id: &str, status: ChunkStatus) -> Result<bool> {
        let variant = self.registry.variant(variant_id)?;
        let chunks = self.stores.content.chunks(variant_id, status).await.or_raise(|| ErrorKind::Content)?;
        if chunks.len() < 2 {
            return Ok(false);
        }
        let index = self.build_index(variant, &chunks)?;
        self.stores.content.store_index(variant_id, status, &index).await.or_raise(|| ErrorKind::Content)?;
        Ok(true)
    }

    fn render_context<'a>(&'a self, variant: &'a Variant) -> RenderContext<'a> {
        RenderContext { variant: &variant.id, stylesheet: self.options.stylesheet.as_deref() }
    }
}
