//! Errors raised by URL producers while turning a work unit into records.

use derive_more::{Display, Error};

/// A producer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for producer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The work unit intentionally yields nothing (the content is gone,
    /// excluded, or otherwise not eligible). Not logged as a failure.
    #[display("work unit skipped")]
    Skip,
    /// The work unit's payload is not what this producer emits.
    #[display("malformed work unit payload")]
    InvalidData,
    /// Anything else went wrong while producing records.
    #[display("URL producer failed")]
    Failed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
