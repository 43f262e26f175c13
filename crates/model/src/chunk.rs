use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::UtcDateTime;

/// The delta reserved for a variant's index document. Content chunks are
/// numbered densely from `1`.
pub const INDEX_DELTA: u32 = 0;

/// Which partition of a variant's content a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkStatus {
    /// Written by the current generation pass, not yet visible to readers.
    Staged,
    /// Currently published.
    Live,
}
impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Live => "live",
        }
    }
}
impl FromStr for ChunkStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "staged" => Self::Staged,
            "live" => Self::Live,
            _ => exn::bail!(ErrorKind::ParseError { field: "chunk status", value: s.to_string() }),
        })
    }
}
impl Display for ChunkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One serialized sitemap document page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub variant_id: String,
    pub delta: u32,
    pub status: ChunkStatus,
    pub document: String,
    pub created_at: UtcDateTime,
    pub link_count: u32,
}
impl Chunk {
    pub fn is_index(&self) -> bool {
        self.delta == INDEX_DELTA
    }
}
