//! Configuration management.
//!
//! Settings come from, in increasing priority: built-in defaults, a TOML file,
//! and `CITATION_ATLAS_`-prefixed environment variables with `__` between
//! section and key (e.g. `CITATION_ATLAS_CRAWL__OUTPUT_DIR=out`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [serpapi]
//! api_key = "your-serpapi-key"
//! page_size = 20
//! timeout_seconds = 30
//!
//! [crawl]
//! output_dir = "results"
//! max_title_len = 30
//! page_timeout_seconds = 60
//!
//! [affiliations]
//! file = "assets/affiliations.csv"
//! keep_warnings = false
//!
//! [map]
//! radius_scale = 6.0
//! radius_log_base = 2.0
//! tiles = "CartoDB Positron"
//!
//! [geocoder]
//! user_agent = "citation-atlas"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::{MapStyle, NOMINATIM_URL};
use crate::crawl::SCHOLAR_URL;
use crate::sources::SerpApiClient;
use crate::utils::DEFAULT_PAGE_SIZE;

/// Environment variable holding the search credential
pub const API_KEY_ENV: &str = "SERP_API_KEY";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CITATION_ATLAS";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serpapi: SerpApiConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub affiliations: AffiliationsConfig,

    #[serde(default)]
    pub map: MapConfig,

    #[serde(default)]
    pub geocoder: GeocoderConfig,
}

/// Search service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpApiConfig {
    /// Credential; `load_config` falls back to `SERP_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_serpapi_url")]
    pub base_url: String,

    /// Results requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SerpApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_serpapi_url(),
            page_size: default_page_size(),
            timeout_seconds: default_search_timeout(),
        }
    }
}

fn default_serpapi_url() -> String {
    crate::sources::SERPAPI_URL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_search_timeout() -> u64 {
    30
}

/// Crawl settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Root of the cache tree
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Title characters kept in directory names
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    /// Prefix of author profile links
    #[serde(default = "default_scholar_url")]
    pub scholar_base_url: String,

    /// Timeout of rendered page downloads
    #[serde(default = "default_page_timeout")]
    pub page_timeout_seconds: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_title_len: default_max_title_len(),
            scholar_base_url: default_scholar_url(),
            page_timeout_seconds: default_page_timeout(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_max_title_len() -> usize {
    30
}

fn default_scholar_url() -> String {
    SCHOLAR_URL.to_string()
}

fn default_page_timeout() -> u64 {
    60
}

/// Affiliation table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliationsConfig {
    #[serde(default = "default_affiliations_file")]
    pub file: PathBuf,

    /// Keep citations and affiliation matches that carry warnings
    #[serde(default)]
    pub keep_warnings: bool,
}

impl Default for AffiliationsConfig {
    fn default() -> Self {
        Self {
            file: default_affiliations_file(),
            keep_warnings: false,
        }
    }
}

fn default_affiliations_file() -> PathBuf {
    PathBuf::from("assets/affiliations.csv")
}

/// Map rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_radius_scale")]
    pub radius_scale: f64,

    /// Logarithm base of marker radii; 0 sizes markers linearly
    #[serde(default = "default_radius_log_base")]
    pub radius_log_base: f64,

    #[serde(default = "default_tiles")]
    pub tiles: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            radius_scale: default_radius_scale(),
            radius_log_base: default_radius_log_base(),
            tiles: default_tiles(),
        }
    }
}

impl MapConfig {
    pub fn style(&self) -> MapStyle {
        MapStyle {
            radius_scale: self.radius_scale,
            radius_log_base: (self.radius_log_base > 0.0).then_some(self.radius_log_base),
            tiles: self.tiles.clone(),
        }
    }
}

fn default_radius_scale() -> f64 {
    6.0
}

fn default_radius_log_base() -> f64 {
    2.0
}

fn default_tiles() -> String {
    "CartoDB Positron".to_string()
}

/// Geocoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_search_timeout(),
        }
    }
}

fn default_geocoder_url() -> String {
    NOMINATIM_URL.to_string()
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    /// Search client for these settings
    pub fn serpapi_client(&self) -> Result<SerpApiClient, crate::sources::SourceError> {
        Ok(SerpApiClient::new(
            std::time::Duration::from_secs(self.serpapi.timeout_seconds),
            std::time::Duration::from_secs(self.crawl.page_timeout_seconds),
        )?
        .with_base_url(&self.serpapi.base_url))
    }

    /// Render as TOML, without the credential
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut shown = self.clone();
        shown.serpapi.api_key = None;
        toml::to_string_pretty(&shown)
    }
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    Ok(with_env_credential(config))
}

/// Fill a missing credential from `SERP_API_KEY`
fn with_env_credential(mut config: Config) -> Config {
    if config.serpapi.api_key.is_none() {
        config.serpapi.api_key = std::env::var(API_KEY_ENV).ok();
    }
    config
}

/// Look for a configuration file in the default locations
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("citation-atlas.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("citation-atlas").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Get the default configuration, with the credential from the environment
pub fn get_config() -> Config {
    with_env_credential(Config::default())
}
