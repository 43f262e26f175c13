//! The generation pipeline: queue rebuild and time-boxed queue draining.

mod generate;
mod rebuild;
#[cfg(test)]
mod tests;

use crate::error::{ErrorKind, Result};
use crate::hook::HookHandle;
use crate::registry::Registry;
use exn::ResultExt;
use sitemap_config::Settings;
use sitemap_model::StashedState;
use sitemap_render::ChunkUrlGenerator;
use sitemap_store::{ContentStorage, Database, LockHandle, ProgressHandle, QueueHandle};
use sitemap_store::{SqliteLock, SqliteProgress, SqliteQueue};
use std::sync::Arc;
use std::time::Duration;

/// Lease shared by rebuild and generation runs.
pub(crate) const LOCK_ID: &str = "sitemap:generation";
/// Lease duration when a run has no time budget.
pub(crate) const UNBOUNDED_LOCK_TIMEOUT: Duration = Duration::from_secs(3600);
/// Added to a run's time budget when taking the lease.
pub(crate) const LOCK_MARGIN: Duration = Duration::from_secs(5);

const STATE_INITIAL_COUNT: &str = "sitemap.queue_items_initial_amount";
const STATE_STASH: &str = "sitemap.queue_stashed_results";

/// How a generation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The queue was drained and the last variant published.
    Completed,
    /// The time budget ran out; state was stashed for the next pass.
    Suspended {
        /// Items still queued.
        remaining: u64,
    },
}

/// Run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Items enqueued by the last rebuild.
    pub initial: u64,
    /// Items still queued.
    pub remaining: u64,
    /// `initial - remaining`, never negative.
    pub processed: u64,
    /// Records held in the stash.
    pub stashed: u64,
}
impl Progress {
    /// Whether a generation run has started and not yet completed.
    pub fn in_progress(&self) -> bool {
        self.remaining + self.stashed > 0
    }
}

/// The pipeline's durable collaborators.
#[derive(Clone)]
pub struct Stores {
    pub content: ContentStorage,
    pub queue: QueueHandle,
    pub progress: ProgressHandle,
    pub lock: LockHandle,
}
impl From<&Database> for Stores {
    /// SQLite-backed stores sharing one database.
    fn from(db: &Database) -> Self {
        Self {
            content: ContentStorage::from(db),
            queue: Arc::new(SqliteQueue::from(db)),
            progress: Arc::new(SqliteProgress::from(db)),
            lock: Arc::new(SqliteLock::from(db)),
        }
    }
}

/// Run settings the pipeline needs, independent of where they came from.
#[derive(Debug, Clone)]
pub struct Options {
    pub base_url: String,
    pub default_variant: String,
    pub remove_duplicates: bool,
    /// Stylesheet referenced from every document.
    pub stylesheet: Option<String>,
    pub queue_batch_size: usize,
    pub chunk_url_template: String,
    /// Used by [`Pipeline::run`].
    pub time_budget: Option<Duration>,
    /// Used by [`Pipeline::run`].
    pub max_links: Option<usize>,
}
impl From<&Settings> for Options {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            default_variant: settings.default_variant.clone(),
            remove_duplicates: settings.remove_duplicates,
            stylesheet: settings.stylesheet().map(str::to_string),
            queue_batch_size: settings.queue_batch_size.max(1),
            chunk_url_template: settings.chunk_url_template.clone(),
            time_budget: settings.time_budget(),
            max_links: settings.max_links(),
        }
    }
}
impl Default for Options {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

pub struct Pipeline {
    registry: Registry,
    stores: Stores,
    options: Options,
    urls: ChunkUrlGenerator,
    hooks: Vec<HookHandle>,
}

impl Pipeline {
    pub fn new(registry: Registry, stores: Stores, options: Options) -> Result<Self> {
        let urls = options.chunk_url_template.parse::<ChunkUrlGenerator>().or_raise(|| ErrorKind::Template)?;
        Ok(Self { registry, stores, options, urls, hooks: Vec::new() })
    }

    /// A pipeline with the built-in producers, configured from `settings`
    /// and persisting everything to `db`.
    pub fn from_settings(settings: &Settings, db: &Database) -> Result<Self> {
        Self::new(Registry::from(settings), Stores::from(db), Options::from(settings))
    }

    pub fn with_hook(mut self, hook: HookHandle) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Read access to published (and staged) content.
    pub fn content(&self) -> &ContentStorage {
        &self.stores.content
    }

    /// Current run counters.
    pub async fn progress(&self) -> Result<Progress> {
        let initial = self.initial_count().await?;
        let remaining = self.stores.queue.count().await.or_raise(|| ErrorKind::Queue)?;
        let stashed = self.load_stash().await?.map_or(0, |s| s.record_count() as u64);
        Ok(Progress { initial, remaining, processed: initial.saturating_sub(remaining), stashed })
    }

    /// Whether a generation run has started and not yet completed.
    pub async fn generation_in_progress(&self) -> Result<bool> {
        Ok(self.progress().await?.in_progress())
    }

    // =========================================================================
    // Lock
    // =========================================================================

    async fn acquire_lock(&self, timeout: Duration) -> Result<()> {
        let acquired = self.stores.lock.acquire(LOCK_ID, timeout).await.or_raise(|| ErrorKind::Lock)?;
        if !acquired {
            exn::bail!(ErrorKind::LockUnavailable);
        }
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        self.stores.lock.release(LOCK_ID).await.or_raise(|| ErrorKind::Lock)
    }

    // =========================================================================
    // Persisted state
    // =========================================================================

    async fn load_stash(&self) -> Result<Option<StashedState>> {
        let value = self.stores.progress.get(STATE_STASH).await.or_raise(|| ErrorKind::Progress)?;
        value
            .map(|v| serde_json::from_value(v).or_raise(|| ErrorKind::InvalidState("stash")))
            .transpose()
    }

    async fn save_stash(&self, state: &StashedState) -> Result<()> {
        let value = serde_json::to_value(state).or_raise(|| ErrorKind::InvalidState("stash"))?;
        self.stores.progress.set(STATE_STASH, &value).await.or_raise(|| ErrorKind::Progress)
    }

    async fn delete_stash(&self) -> Result<()> {
        self.stores.progress.delete(STATE_STASH).await.or_raise(|| ErrorKind::Progress)
    }

    async fn initial_count(&self) -> Result<u64> {
        let value = self.stores.progress.get(STATE_INITIAL_COUNT).await.or_raise(|| ErrorKind::Progress)?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0))
    }

    async fn set_initial_count(&self, count: u64) -> Result<()> {
        self.stores
            .progress
            .set(STATE_INITIAL_COUNT, &serde_json::Value::from(count))
            .await
            .or_raise(|| ErrorKind::Progress)
    }
}
