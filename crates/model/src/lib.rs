//! Data types shared between sitemap storage, rendering and generation.
//!
//! Nothing in this crate performs I/O. Every type that crosses a persistence
//! boundary (queue payloads, the stash blob, URL records inside it) derives
//! serde so the stores can persist them verbatim as JSON.

mod chunk;
pub mod error;
mod link;
mod stash;
mod variant;
mod work;

pub use crate::chunk::{Chunk, ChunkStatus, INDEX_DELTA};
pub use crate::link::{ChangeFrequency, ImageRef, UrlRecord};
pub use crate::stash::StashedState;
pub use crate::variant::{ContentStatus, SitemapType, Variant};
pub use crate::work::{QueueItem, WorkUnit};

/// Normalize a user-supplied keyword for lenient matching: lowercase and
/// strip anything that isn't alphanumeric.
pub(crate) fn sanitize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}
