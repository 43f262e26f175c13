use sitemap_model::{UrlRecord, Variant};
use std::sync::Arc;

pub type HookHandle = Arc<dyn LinkHook + Send + Sync>;

/// Alters a variant's freshly produced records before they are committed to
/// a chunk.
///
/// Hooks run in registration order over each batch of de-duplicated records
/// just before it joins the variant's pending chunk content. They may
/// rewrite, add or remove records.
pub trait LinkHook: Send + Sync {
    fn alter(&self, variant: &Variant, links: &mut Vec<UrlRecord>);
}
