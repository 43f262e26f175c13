use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use sitemap_model::{Chunk, ChunkStatus};
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct ChunkRow {
    variant: String,
    delta: i64,
    status: String,
    document: String,
    link_count: i64,
    created_at: i64,
}
impl TryFrom<ChunkRow> for Chunk {
    type Error = Error;
    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            variant_id: row.variant,
            delta: u32::try_from(row.delta).or_raise(|| ErrorKind::InvalidData("chunk delta"))?,
            status: row.status.parse::<ChunkStatus>().or_raise(|| ErrorKind::InvalidData("chunk status"))?,
            document: row.document,
            link_count: u32::try_from(row.link_count).or_raise(|| ErrorKind::InvalidData("link count"))?,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("chunk creation date"))?,
        })
    }
}
