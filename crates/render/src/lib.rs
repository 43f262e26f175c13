//! Turning URL records into sitemap documents.
//!
//! - [`Serializer`] is the capability the generation pipeline writes chunk
//!   and index documents through; implementations are registered by id.
//! - [`XmlSerializer`] writes the standard sitemaps.org 0.9 format.
//! - [`ChunkUrlGenerator`] renders the public URL of each content chunk for
//!   inclusion in a variant's index document.

pub mod error;
mod serializer;
mod url;
mod xml;

pub use crate::serializer::{IndexEntry, RenderContext, Serializer, SerializerHandle};
pub use crate::url::{ChunkUrlGenerator, DEFAULT_CHUNK_URL_TEMPLATE};
pub use crate::xml::XmlSerializer;
