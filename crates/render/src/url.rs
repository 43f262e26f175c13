//! Chunk URL templating.
//!
//! The public location of each content chunk is rendered from a user
//! configurable [upon] template so that sites can route sitemap requests
//! however they like. The template sees:
//!
//! | Variable     | Type     | Description                                        |
//! |--------------|----------|----------------------------------------------------|
//! | `base_url`   | `String` | Configured base URL, without trailing slashes      |
//! | `variant`    | `String` | Variant identifier                                 |
//! | `delta`      | `u64`    | Content chunk number (from 1)                      |
//! | `is_default` | `bool`   | Whether this is the configured default variant     |

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// `{base}/sitemap.xml?page=N` for the default variant, and
/// `{base}/{variant}/sitemap.xml?page=N` for every other variant.
pub const DEFAULT_CHUNK_URL_TEMPLATE: &str =
    "{{ base_url }}{% if not is_default %}/{{ variant }}{% endif %}/sitemap.xml?page={{ delta }}";

/// Renders chunk URLs from a compiled template.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
pub struct ChunkUrlGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for ChunkUrlGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let engine = Engine::new();
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl ChunkUrlGenerator {
    #[instrument(skip(self))]
    pub fn generate(&self, base_url: &str, variant: &str, delta: u32, is_default: bool) -> Result<String> {
        let url = self
            .template
            .render(
                &self.engine,
                upon::value! {
                    base_url: base_url.trim_end_matches('/'),
                    variant: variant,
                    delta: u64::from(delta),
                    is_default: is_default,
                },
            )
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Ok(url.trim().to_string())
    }
}
