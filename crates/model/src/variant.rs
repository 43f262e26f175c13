use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// One independently configured sitemap output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Lower weights are processed (and listed) first.
    #[serde(default)]
    pub weight: i32,
    /// Identifier of the [`SitemapType`] this variant is generated with.
    #[serde(rename = "type")]
    pub type_id: String,
}
impl Variant {
    pub fn new(id: impl Into<String>, type_id: impl Into<String>) -> Self {
        Self { id: id.into(), label: None, weight: 0, type_id: type_id.into() }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Sort variants by weight, falling back to their identifier so the
    /// order is stable between runs.
    pub fn sort(variants: &mut [Variant]) {
        variants.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.id.cmp(&b.id)));
    }
}

/// The generation rules of a variant: which producers feed it (in order) and
/// which serializer writes its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapType {
    pub id: String,
    pub producers: Vec<String>,
    pub serializer: String,
}

/// Publication state of a variant, derived from which chunk partitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentStatus {
    /// Nothing is live (there may or may not be staged chunks).
    Unpublished,
    /// Only live chunks exist.
    Published,
    /// Live chunks are being served while a new set is being staged.
    PublishedAndRegenerating,
}
impl ContentStatus {
    pub fn from_partitions(has_staged: bool, has_live: bool) -> Self {
        match (has_staged, has_live) {
            (_, false) => Self::Unpublished,
            (false, true) => Self::Published,
            (true, true) => Self::PublishedAndRegenerating,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpublished => "unpublished",
            Self::Published => "published",
            Self::PublishedAndRegenerating => "published-and-regenerating",
        }
    }
}
impl Display for ContentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
