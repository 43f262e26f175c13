mod chunk;
mod queue;

pub(crate) use self::chunk::ChunkRow;
pub(crate) use self::queue::QueueRow;
