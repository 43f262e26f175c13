use super::error::{ErrorKind, Result};
use super::{DataSetStream, UrlProducer};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use sitemap_config::Settings;
use sitemap_model::{UrlRecord, Variant};
use std::collections::BTreeMap;

/// Passes complete, pre-built URL records through untouched. Each record is
/// its own work unit.
#[derive(Debug, Clone, Default)]
pub struct ArbitraryProducer {
    links: BTreeMap<String, Vec<UrlRecord>>,
}
impl ArbitraryProducer {
    pub const ID: &'static str = "arbitrary";

    pub fn new(links: BTreeMap<String, Vec<UrlRecord>>) -> Self {
        Self { links }
    }
}
impl From<&Settings> for ArbitraryProducer {
    fn from(settings: &Settings) -> Self {
        Self::new(settings.arbitrary_links.clone())
    }
}

#[async_trait]
impl UrlProducer for ArbitraryProducer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn data_sets<'a>(&'a self, variant: &'a Variant) -> DataSetStream<'a> {
        Box::pin(stream! {
            for record in self.links.get(&variant.id).into_iter().flatten() {
                yield serde_json::to_value(record).or_raise(|| ErrorKind::InvalidData);
            }
        })
    }

    async fn generate(&self, _variant: &Variant, data: &Value) -> Result<Vec<UrlRecord>> {
        let record: UrlRecord = serde_json::from_value(data.clone()).or_raise(|| ErrorKind::InvalidData)?;
        Ok(vec![record])
    }
}
