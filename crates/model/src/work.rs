use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One dequeue-able unit of enumeration work.
///
/// The `data` payload is opaque to everything except the producer that
/// emitted it. This is also the persisted shape of a queue item's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub producer_id: String,
    pub variant_id: String,
    pub data: Value,
}
impl WorkUnit {
    pub fn new(variant_id: impl Into<String>, producer_id: impl Into<String>, data: Value) -> Self {
        Self { producer_id: producer_id.into(), variant_id: variant_id.into(), data }
    }
}

/// A work unit as handed out by the queue, with the identifier needed to
/// delete it once processed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: i64,
    pub unit: WorkUnit,
}
