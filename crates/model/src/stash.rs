use crate::link::UrlRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The generation pipeline's entire working memory.
///
/// Persisted verbatim when a pass is suspended and restored verbatim when
/// the next pass resumes. Field names on the wire are part of the persisted
/// format and must not change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StashedState {
    /// The variant being accumulated, if any item had been reached.
    #[serde(rename = "variant_id", default)]
    pub variant: Option<String>,
    /// Records that have not yet been through the link hooks.
    #[serde(rename = "results", default)]
    pub unflushed: Vec<UrlRecord>,
    /// Hook-processed records waiting to fill a chunk.
    #[serde(rename = "processed_results", default)]
    pub accumulated: Vec<UrlRecord>,
    /// Dedup keys already emitted in the current variant pass.
    #[serde(rename = "processed_paths", default)]
    pub seen_keys: BTreeSet<String>,
}
impl StashedState {
    /// Number of records held in memory (both lists).
    pub fn record_count(&self) -> usize {
        self.unflushed.len() + self.accumulated.len()
    }
}
