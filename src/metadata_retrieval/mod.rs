//! Data structures and traits for movie metadata retrieval.
//!
//! This module provides structures to represent search candidates, metadata
//! records, artwork and trailers, as well as the [`MetadataProvider`] trait
//! every external source implements.
mod fanart;
mod fanart_types;
mod registry;
mod tmdb;
mod tmdb_types;

pub use fanart::FanartTvProvider;
pub use registry::ProviderRegistry;
pub use tmdb::TmdbProvider;

use crate::fetch_cache::FetchCache;
use crate::http::FetchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during metadata retrieval operations.
///
/// A legitimately empty answer is always `Ok(vec![])`; these variants only
/// describe failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request to the provider failed
    #[error("Request failed: {0}")]
    Request(#[from] FetchError),

    /// Failed to parse the provider's response
    #[error("Failed to parse {provider} response: {reason}")]
    Parse { provider: String, reason: String },

    /// The requested title was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider returned invalid or unexpected data
    #[error("Provider returned invalid data: {0}")]
    InvalidData(String),

    /// The provider needs an API key that was not configured
    #[error("No API key configured for provider '{0}'")]
    MissingApiKey(String),

    /// The provider does not offer the requested capability
    #[error("Provider '{provider}' does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },
}

/// What a provider is asked to search for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text title query
    pub query: String,
    /// Release year hint
    pub year: Option<u32>,
    /// External (IMDb) id hint
    pub imdb_id: Option<String>,
    /// Preferred language, ISO 639-1
    pub language: String,
    /// Preferred country, ISO 3166-1 alpha-2
    pub country: String,
}

/// A search result proposing a possible identity for a queried title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Id of the provider that produced this candidate
    pub provider_id: String,
    /// Provider-specific id used for detail lookups
    pub id: String,
    /// IMDb id, when the provider knows it
    pub imdb_id: Option<String>,
    /// Display title
    pub title: String,
    /// Secondary localized title (aka)
    pub localized_title: Option<String>,
    /// Release year
    pub year: Option<u32>,
    /// Poster image reference
    pub poster_url: Option<String>,
    /// Similarity score in [0, 1]; unscored candidates are scored by the resolver
    pub score: Option<f64>,
    /// Full record, when the provider already resolved it during search
    pub metadata: Option<Box<MetadataRecord>>,
}

impl SearchCandidate {
    /// Creates an unscored candidate
    pub fn new(provider_id: &str, id: &str, title: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            id: id.to_string(),
            imdb_id: None,
            title: title.to_string(),
            localized_title: None,
            year: None,
            poster_url: None,
            score: None,
            metadata: None,
        }
    }

    /// Title to show (and to match against) for the given language
    ///
    /// Non-English users see the localized title when one exists.
    pub fn display_title(&self, language: &str) -> &str {
        match &self.localized_title {
            Some(aka) if !aka.trim().is_empty() && !language.eq_ignore_ascii_case("en") => aka,
            _ => &self.title,
        }
    }

    /// Score, treating unscored candidates as zero
    pub fn score_or_zero(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}

/// Role of a person in the credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastRole {
    Director,
    Writer,
    Producer,
    Actor,
}

/// A person credited on a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub role: CastRole,
    pub name: String,
    /// Character played, or the crew job
    pub part: Option<String>,
    pub image_url: Option<String>,
}

/// Age rating for one country
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub country: String,
    pub label: String,
}

/// Link to a movie collection (saga / series)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionLink {
    pub id: u64,
    pub name: String,
}

/// Unified metadata for one movie
///
/// Text fields use the empty string for "absent", everything else is an
/// `Option` or an empty list until populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub provider_id: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u64>,
    pub title: String,
    pub original_title: String,
    pub tagline: String,
    pub plot: String,
    pub year: Option<u32>,
    /// ISO 8601 date (YYYY-MM-DD)
    pub release_date: Option<String>,
    pub runtime_minutes: Option<u32>,
    /// Average rating on a 0-10 scale
    pub rating: Option<f32>,
    pub vote_count: Option<u32>,
    pub top250: Option<u32>,
    pub countries: Vec<String>,
    pub spoken_languages: Vec<String>,
    pub certifications: Vec<Certification>,
    pub genres: Vec<String>,
    pub cast: Vec<CastMember>,
    pub production_companies: Vec<String>,
    pub collection: Option<CollectionLink>,
}

/// Which detail page a metadata fetch targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailPart {
    /// Main detail page: ids, titles, numbers, credits
    Primary,
    /// Plot and tagline page in the preferred language
    Supplementary,
    /// Localized titles, plot and collection info
    Localized,
}

/// A request for one detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRequest {
    /// Provider id or IMDb id of the title
    pub id: String,
    pub part: DetailPart,
    pub language: String,
    pub country: String,
}

/// Kinds of artwork a provider can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Poster,
    Background,
    Banner,
    Logo,
    Disc,
    Thumb,
}

/// Reference to one artwork image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artwork {
    pub provider_id: String,
    pub kind: ArtworkKind,
    pub url: String,
    pub preview_url: Option<String>,
    pub language: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Reference to one trailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trailer {
    pub provider_id: String,
    pub name: String,
    pub url: String,
    /// Hosting site, e.g. "YouTube"
    pub site: String,
    pub quality: Option<String>,
    pub language: Option<String>,
}

/// What artwork and trailer lookups are keyed on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaCriteria {
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u64>,
    pub title: String,
    pub year: Option<u32>,
    pub language: String,
    pub country: String,
    /// Artwork kinds to return; empty means all
    pub kinds: Vec<ArtworkKind>,
}

impl MediaCriteria {
    /// Builds lookup criteria from a resolved record
    pub fn from_record(record: &MetadataRecord, language: &str, country: &str) -> Self {
        Self {
            imdb_id: record.imdb_id.clone(),
            tmdb_id: record.tmdb_id,
            title: record.title.clone(),
            year: record.year,
            language: language.to_string(),
            country: country.to_string(),
            kinds: Vec::new(),
        }
    }

    /// Whether artwork of `kind` was requested
    pub fn wants(&self, kind: ArtworkKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// Trait for external metadata, artwork and trailer sources.
///
/// Implementors issue every network read through the shared [`FetchCache`].
/// Sources that do not offer artwork or trailers keep the default
/// implementations, which report a legitimately empty result.
pub trait MetadataProvider: Send + Sync {
    /// Short stable id, e.g. "tmdb"
    fn id(&self) -> &str;

    /// Searches for candidates matching the query
    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, ProviderError> {
        let _ = query;
        Err(ProviderError::Unsupported {
            provider: self.id().to_string(),
            capability: "search",
        })
    }

    /// Fetches one detail page and maps it onto a partial record
    fn fetch_metadata(&self, request: &DetailRequest) -> Result<MetadataRecord, ProviderError> {
        let _ = request;
        Err(ProviderError::Unsupported {
            provider: self.id().to_string(),
            capability: "metadata",
        })
    }

    /// Fetches artwork for the given criteria
    fn fetch_artwork(&self, criteria: &MediaCriteria) -> Result<Vec<Artwork>, ProviderError> {
        let _ = criteria;
        Ok(Vec::new())
    }

    /// Fetches trailers for the given criteria
    fn fetch_trailers(&self, criteria: &MediaCriteria) -> Result<Vec<Trailer>, ProviderError> {
        let _ = criteria;
        Ok(Vec::new())
    }
}

/// Fetches `url` through the cache and deserializes the JSON body
///
/// A body that does not parse is evicted from the cache before the error is
/// returned, so a retry re-issues the network request.
pub(crate) fn fetch_json<T: DeserializeOwned>(
    cache: &FetchCache,
    provider: &str,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<T, ProviderError> {
    let body = cache.get_or_fetch(url, headers)?;

    serde_json::from_str(&body).map_err(|e| {
        warn!(provider, error = %e, "unparsable response, invalidating cache entry");
        cache.invalidate(url);
        ProviderError::Parse {
            provider: provider.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Cleans provider text: strips HTML, replaces non-breaking spaces, trims
pub(crate) fn clean_text(text: &str) -> String {
    let text = if text.contains('<') {
        nanohtml2text::html2text(text)
    } else {
        text.to_string()
    };
    text.replace('\u{a0}', " ").trim().to_string()
}

/// Extracts the year from an ISO date such as "2012-06-21"
pub(crate) fn year_from_date(date: &str) -> Option<u32> {
    date.get(..4)?.parse().ok().filter(|year| *year > 0)
}
