//! Generator Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Producers have their own error type
//! in [`producer::error`](crate::producer::error).

use derive_more::{Display, Error};

/// A generator error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Another rebuild or generation run holds the lock. Try again on the
    /// next scheduled invocation.
    #[display("another sitemap run is in progress")]
    LockUnavailable,
    #[display("unknown sitemap variant: {_0}")]
    UnknownVariant(#[error(not(source))] String),
    #[display("unknown sitemap type: {_0}")]
    UnknownType(#[error(not(source))] String),
    #[display("unknown URL producer: {_0}")]
    UnknownProducer(#[error(not(source))] String),
    #[display("unknown serializer: {_0}")]
    UnknownSerializer(#[error(not(source))] String),
    /// A producer failed to enumerate its work units during a queue rebuild.
    #[display("URL producer '{_0}' could not enumerate its data sets")]
    Producer(#[error(not(source))] String),
    #[display("issue with the work queue")]
    Queue,
    #[display("issue with the progress store")]
    Progress,
    #[display("issue with the lock service")]
    Lock,
    #[display("issue with sitemap content storage")]
    Content,
    #[display("could not serialize sitemap document")]
    Serializer,
    #[display("issue with chunk URL generation")]
    Template,
    /// Persisted pipeline state could not be decoded.
    #[display("invalid persisted state: {_0}")]
    InvalidState(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable | Self::Queue | Self::Progress | Self::Lock | Self::Content)
    }
}
