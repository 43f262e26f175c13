//! Render Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Writing the XML document failed.
    #[display("could not write sitemap document")]
    Xml,
    /// A date could not be formatted for a `<lastmod>` element.
    #[display("could not format date for field: {_0}")]
    Date(#[error(not(source))] &'static str),
    /// The chunk URL template could not be compiled or rendered.
    #[display("issue with chunk URL generation from template")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
