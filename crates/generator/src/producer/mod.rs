//! URL producers: pluggable sources of sitemap content.
//!
//! A producer does two things for a variant:
//! 1. lazily enumerates opaque work units ([`data_sets`](UrlProducer::data_sets)),
//!    which the queue rebuild stores verbatim;
//! 2. later turns one of those work units into zero or more URL records
//!    ([`generate`](UrlProducer::generate)).
//!
//! The enumeration must be restartable: a second rebuild has to reproduce an
//! equivalent sequence. Individual records that shouldn't be included are
//! simply left out of the returned list; a whole work unit can be skipped
//! with [`ErrorKind::Skip`](error::ErrorKind::Skip).

mod arbitrary;
mod custom;
pub mod error;

pub use self::arbitrary::ArbitraryProducer;
pub use self::custom::CustomLinkProducer;
use self::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use sitemap_model::{UrlRecord, Variant};
use std::pin::Pin;
use std::sync::Arc;

pub type DataSetStream<'a> = Pin<Box<dyn Stream<Item = Result<Value>> + Send + 'a>>;
pub type ProducerHandle = Arc<dyn UrlProducer + Send + Sync>;

#[async_trait]
pub trait UrlProducer: Send + Sync {
    /// Identifier that sitemap types reference this producer by.
    fn id(&self) -> &str;

    /// Enumerate the work units for `variant`, one JSON payload per unit.
    fn data_sets<'a>(&'a self, variant: &'a Variant) -> DataSetStream<'a>;

    /// Turn one work unit into URL records.
    async fn generate(&self, variant: &Variant, data: &Value) -> Result<Vec<UrlRecord>>;
}
