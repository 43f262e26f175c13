//! SQLite persistence for sitemap generation.
//!
//! One database file holds everything the generation pipeline needs to
//! survive between invocations:
//! - **Chunks**: serialized sitemap documents per variant, split into a
//!   staged partition (being built) and a live partition (being served).
//!   See [`ContentStorage`].
//! - **Queue**: the durable FIFO of work units. See [`QueueStore`].
//! - **State**: a small key/value store for counters and the stash blob.
//!   See [`ProgressStore`].
//! - **Locks**: named leases that expire on their own. See [`LockService`].
//!
//! The queue, state and lock concerns are traits so the pipeline only ever
//! sees a handle; the SQLite implementations are the ones shipped here.

mod content;
mod db;
pub mod error;
mod lock;
mod models;
mod progress;
mod queue;

pub use crate::content::{ContentStorage, IndexDocument, Publish};
pub use crate::db::Database;
pub use crate::lock::{LockService, SqliteLock};
pub use crate::progress::{ProgressStore, SqliteProgress};
pub use crate::queue::{QueueStore, SqliteQueue};
use std::sync::Arc;

pub type LockHandle = Arc<dyn LockService + Send + Sync>;
pub type ProgressHandle = Arc<dyn ProgressStore + Send + Sync>;
pub type QueueHandle = Arc<dyn QueueStore + Send + Sync>;

/// Current time as milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    let millis = time::UtcDateTime::now().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}
