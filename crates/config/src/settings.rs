use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sitemap_model::{ChangeFrequency, SitemapType, UrlRecord, Variant};
use sitemap_render::{ChunkUrlGenerator, DEFAULT_CHUNK_URL_TEMPLATE};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::instrument;

const ENV_PREFIX: &str = "SITEMAP_";
const SETTINGS_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "sitemap.sqlite";
const DEFAULT_TYPE: &str = "default_hreflang";

static VARIANT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w-]+$").expect("variant id pattern is valid"));

/// A configured path to include in a variant, made absolute against
/// [`Settings::base_url`] at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLink {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<ChangeFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database holding chunks, the queue, progress state and locks.
    pub database: PathBuf,
    /// Absolute base URL for chunk locations and custom links.
    pub base_url: String,
    /// Links per chunk, `0` writes every variant as a single chunk.
    pub max_links: usize,
    /// Time budget of one generation pass in milliseconds, `0` is unbounded.
    pub generate_duration: u64,
    pub remove_duplicates: bool,
    /// Reference an XSL stylesheet from every document.
    pub xsl: bool,
    pub xsl_href: String,
    /// The variant served from the site root.
    pub default_variant: String,
    /// Number of work units written to the queue per batch during a rebuild.
    pub queue_batch_size: usize,
    pub chunk_url_template: String,
    pub variants: Vec<Variant>,
    pub types: Vec<SitemapType>,
    pub custom_links: BTreeMap<String, Vec<CustomLink>>,
    pub arbitrary_links: BTreeMap<String, Vec<UrlRecord>>,
}

impl Default for Settings {
    fn default() -> Self {
        let database = Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        Self {
            database,
            base_url: "http://localhost".to_string(),
            max_links: 2000,
            generate_duration: 10_000,
            remove_duplicates: true,
            xsl: true,
            xsl_href: "/sitemap.xsl".to_string(),
            default_variant: "default".to_string(),
            queue_batch_size: 5000,
            chunk_url_template: DEFAULT_CHUNK_URL_TEMPLATE.to_string(),
            variants: vec![Variant::new("default", DEFAULT_TYPE)],
            types: vec![SitemapType {
                id: DEFAULT_TYPE.to_string(),
                producers: vec!["custom".to_string(), "arbitrary".to_string()],
                serializer: "default".to_string(),
            }],
            custom_links: BTreeMap::from([(
                "default".to_string(),
                vec![CustomLink { path: "/".to_string(), priority: Some(1.0), changefreq: Some(ChangeFrequency::Daily) }],
            )]),
            arbitrary_links: BTreeMap::new(),
        }
    }
}

impl Settings {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "sitemap")
    }

    /// Location of the settings file used when none is given explicitly.
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Load, merge and validate settings.
    ///
    /// An explicit `path` must exist. Without one, the platform default
    /// location is used if a file is present there.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = Self::merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.is_file()) {
                    figment = Self::merge_file(figment, &path)?;
                }
            },
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Extract)?;
        settings.validate()?;
        tracing::debug!(variants = settings.variants.len(), "Loaded settings");
        Ok(settings)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    /// Check the settings are internally consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| exn::Exn::from(ErrorKind::Invalid(reason));
        if self.queue_batch_size == 0 {
            return Err(invalid("queue_batch_size must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !VARIANT_ID.is_match(&variant.id) {
                return Err(invalid(format!("variant id '{}' may only contain letters, digits, '_' and '-'", variant.id)));
            }
            if !seen.insert(variant.id.as_str()) {
                return Err(invalid(format!("variant '{}' is defined more than once", variant.id)));
            }
            self.sitemap_type(&variant.type_id)
                .ok_or_raise(|| ErrorKind::Invalid(format!("variant '{}' uses unknown type '{}'", variant.id, variant.type_id)))?;
        }
        if !self.default_variant.is_empty() && self.variant(&self.default_variant).is_none() {
            return Err(invalid(format!("default variant '{}' is not defined", self.default_variant)));
        }
        let priorities = self
            .custom_links
            .values()
            .flatten()
            .filter_map(|link| link.priority)
            .chain(self.arbitrary_links.values().flatten().filter_map(|link| link.priority));
        for priority in priorities {
            if !(0.0..=1.0).contains(&priority) {
                return Err(invalid(format!("priority {priority} is outside 0.0 to 1.0")));
            }
        }
        self.chunk_url_template
            .parse::<ChunkUrlGenerator>()
            .or_raise(|| ErrorKind::Invalid("chunk_url_template does not compile".into()))?;
        Ok(())
    }

    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn sitemap_type(&self, id: &str) -> Option<&SitemapType> {
        self.types.iter().find(|t| t.id == id)
    }

    /// Links per chunk, `None` when chunking is disabled.
    pub fn max_links(&self) -> Option<usize> {
        (self.max_links > 0).then_some(self.max_links)
    }

    /// Time budget of one generation pass, `None` when unbounded.
    pub fn time_budget(&self) -> Option<Duration> {
        (self.generate_duration > 0).then(|| Duration::from_millis(self.generate_duration))
    }

    /// Stylesheet to reference from documents, if enabled.
    pub fn stylesheet(&self) -> Option<&str> {
        self.xsl.then_some(self.xsl_href.as_str())
    }
}
