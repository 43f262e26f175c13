use super::error::{ErrorKind, Result};
use super::{DataSetStream, UrlProducer};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use sitemap_config::{CustomLink, Settings};
use sitemap_model::{UrlRecord, Variant};
use std::collections::BTreeMap;

/// Produces one record per configured custom path, made absolute against the
/// site's base URL. The path doubles as the record's dedup key.
#[derive(Debug, Clone)]
pub struct CustomLinkProducer {
    base_url: String,
    links: BTreeMap<String, Vec<CustomLink>>,
}
impl CustomLinkProducer {
    pub const ID: &'static str = "custom";

    pub fn new(base_url: impl Into<String>, links: BTreeMap<String, Vec<CustomLink>>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, links }
    }
}
impl From<&Settings> for CustomLinkProducer {
    fn from(settings: &Settings) -> Self {
        Self::new(&settings.base_url, settings.custom_links.clone())
    }
}

#[async_trait]
impl UrlProducer for CustomLinkProducer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn data_sets<'a>(&'a self, variant: &'a Variant) -> DataSetStream<'a> {
        Box::pin(stream! {
            for link in self.links.get(&variant.id).into_iter().flatten() {
                yield serde_json::to_value(link).or_raise(|| ErrorKind::InvalidData);
            }
        })
    }

    async fn generate(&self, _variant: &Variant, data: &Value) -> Result<Vec<UrlRecord>> {
        let link: CustomLink = serde_json::from_value(data.clone()).or_raise(|| ErrorKind::InvalidData)?;
        if !link.path.starts_with('/') {
            tracing::debug!(path = %link.path, "Skipping custom link that is not a site path");
            exn::bail!(ErrorKind::Skip);
        }
        let mut record = UrlRecord::new(format!("{}{}", self.base_url, link.path)).with_dedup_key(&link.path);
        record.priority = link.priority;
        record.change_frequency = link.changefreq;
        Ok(vec![record])
    }
}
