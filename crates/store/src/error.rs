//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Serialization/deserialization error, or a value out of range for its column.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A queue item whose payload can't be decoded. It will never succeed,
    /// so the caller should delete it by the given id.
    #[display("queue item {_0} has an undecodable payload")]
    InvalidPayload(#[error(not(source))] i64),
    /// The index document has its own accessor, content lookups start at 1.
    #[display("chunk delta {_0} is reserved for the index document")]
    ReservedDelta(#[error(not(source))] u32),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY surfaces as a generic database error.
        matches!(self, Self::Database)
    }
}
