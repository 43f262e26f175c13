//! Resumable, time-bounded sitemap generation.
//!
//! A [`Pipeline`] owns two operations:
//! - [`rebuild_queue`](Pipeline::rebuild_queue) asks every variant's URL
//!   producers for their work units and loads them into the durable queue.
//! - [`generate`](Pipeline::generate) drains that queue one item at a time
//!   within a time budget, turning items into URL records, de-duplicating
//!   them, writing full chunks as staged content and publishing each variant
//!   once its items are exhausted. When the budget runs out, the in-memory
//!   state is stashed and the next call picks up exactly where this one
//!   stopped.
//!
//! Only one rebuild or generation run may be active at a time; both take the
//! same named lease from the [`LockService`](sitemap_store::LockService).

pub mod error;
mod hook;
mod pipeline;
pub mod producer;
mod registry;

pub use crate::hook::{HookHandle, LinkHook};
pub use crate::pipeline::{GenerateOutcome, Options, Pipeline, Progress, Stores};
pub use crate::producer::{ArbitraryProducer, CustomLinkProducer, ProducerHandle, UrlProducer};
pub use crate::registry::Registry;
