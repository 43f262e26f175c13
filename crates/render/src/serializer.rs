use crate::error::Result;
use sitemap_model::UrlRecord;
use std::sync::Arc;
use time::OffsetDateTime;

pub type SerializerHandle = Arc<dyn Serializer + Send + Sync>;

/// Variant-level settings available while writing a document.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub variant: &'a str,
    /// Location of an XSL stylesheet to reference, if any.
    pub stylesheet: Option<&'a str>,
}

/// One `<sitemap>` entry of an index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub url: String,
    pub last_modified: Option<OffsetDateTime>,
}

/// Writes the serialized form of sitemap chunks and index documents.
pub trait Serializer: Send + Sync {
    /// Identifier that sitemap types reference this serializer by.
    fn id(&self) -> &str;

    /// Write one content chunk listing `links`.
    fn chunk_document(&self, context: &RenderContext<'_>, links: &[UrlRecord]) -> Result<String>;

    /// Write an index document pointing at a variant's content chunks.
    fn index_document(&self, context: &RenderContext<'_>, entries: &[IndexEntry]) -> Result<String>;
}
