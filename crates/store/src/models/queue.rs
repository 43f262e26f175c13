use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use sitemap_model::{QueueItem, WorkUnit};

#[derive(sqlx::FromRow)]
pub(crate) struct QueueRow {
    pub(crate) item_id: i64,
    payload: String,
}
impl TryFrom<QueueRow> for QueueItem {
    type Error = Error;
    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let unit: WorkUnit = serde_json::from_str(&row.payload).or_raise(|| ErrorKind::InvalidPayload(row.item_id))?;
        Ok(Self { id: row.item_id, unit })
    }
}
