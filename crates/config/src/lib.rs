//! Layered settings for sitemap generation.
//!
//! Settings are merged from three sources, later ones winning:
//! 1. compiled defaults ([`Settings::default`]),
//! 2. a settings file (TOML, YAML or JSON, picked by extension),
//! 3. `SITEMAP_`-prefixed environment variables, with `__` separating nested
//!    keys (`SITEMAP_BASE_URL`, `SITEMAP_MAX_LINKS`, ...).

pub mod error;
mod settings;

pub use crate::settings::{CustomLink, Settings};
