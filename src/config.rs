//! Scrape configuration
//!
//! [`ScrapeOptions`] is the complete set of caller-supplied settings. It can be
//! loaded from a TOML file; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default number of parallel workers
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`ScrapeOptions`]
    #[error("Invalid config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Options controlling one scrape batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeOptions {
    /// Let the enrichment provider overwrite titles and plot with localized text
    pub scrape_foreign_language: bool,
    /// Fetch collection (saga) linkage from the enrichment provider
    pub scrape_collection_info: bool,
    /// ISO 639-1 language code
    pub preferred_language: String,
    /// ISO 3166-1 alpha-2 country code, used for certifications
    pub preferred_country: String,
    /// Provider used for search and the primary/supplementary detail pages
    pub metadata_provider: String,
    /// Provider used for optional localized enrichment
    pub enrichment_provider: String,
    /// Artwork providers, tried in order until one returns artwork
    pub artwork_providers: Vec<String>,
    /// Trailer providers, all of which are asked
    pub trailer_providers: Vec<String>,
    /// Number of parallel workers
    pub concurrency: usize,
    /// Timeout for a single network request
    pub fetch_timeout_secs: u64,
    /// Cached documents older than this are fetched again
    pub cache_ttl_secs: Option<u64>,
    pub tmdb_api_key: Option<String>,
    pub fanart_api_key: Option<String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            scrape_foreign_language: false,
            scrape_collection_info: false,
            preferred_language: "en".to_string(),
            preferred_country: "US".to_string(),
            metadata_provider: "tmdb".to_string(),
            enrichment_provider: "tmdb".to_string(),
            artwork_providers: vec!["tmdb".to_string(), "fanarttv".to_string()],
            trailer_providers: vec!["tmdb".to_string()],
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: 30,
            cache_ttl_secs: None,
            tmdb_api_key: None,
            fanart_api_key: None,
        }
    }
}

impl ScrapeOptions {
    /// Loads options from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Worker count, never below one
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Whether the optional enrichment fetch should run at all
    pub fn wants_enrichment(&self) -> bool {
        self.scrape_foreign_language || self.scrape_collection_info
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}
