//! FilmSleuth - Resolve and scrape movie metadata in batches
//!
//! This library takes a batch of movie titles lacking authoritative metadata
//! and, for each one, resolves the best matching external record, aggregates
//! descriptive fields from several sources, and collects artwork and trailer
//! references. Items are processed by a fixed pool of workers; a failure of
//! any single source or item never aborts the batch.

mod aggregator;
mod cache;
mod config;
mod fallback;
mod fetch_cache;
mod http;
mod match_resolver;
mod metadata_retrieval;
mod pipeline;
mod scheduler;
mod temp;

use std::sync::Arc;
use thiserror::Error;

// Re-export error types
pub use aggregator::AggregationError;
pub use cache::CacheError;
pub use config::ConfigError;
pub use http::FetchError;
pub use metadata_retrieval::ProviderError;
pub use scheduler::ScrapeError;

pub use aggregator::{MetadataAggregator, merge_records};
pub use cache::CacheStats;
pub use config::{DEFAULT_CONCURRENCY, ScrapeOptions};
pub use fallback::{FallbackResult, collect_artwork, collect_trailers};
pub use fetch_cache::{CacheEntry, FetchCache, normalize_url};
pub use http::{HttpFetcher, ReqwestFetcher, accept_language};
pub use match_resolver::{
    MatchHints, MatchResolver, Resolution, SCORE_PENALTY, clean_search_term, is_valid_imdb_id,
    rank_candidates, score_candidate, select_match, title_similarity,
};
pub use metadata_retrieval::{
    Artwork, ArtworkKind, CastMember, CastRole, Certification, CollectionLink, DetailPart,
    DetailRequest, FanartTvProvider, MediaCriteria, MetadataProvider, MetadataRecord,
    ProviderRegistry, SearchCandidate, SearchQuery, TmdbProvider, Trailer,
};
pub use pipeline::ScrapePipeline;
pub use scheduler::{
    BatchEntry, BatchReport, BatchScheduler, BatchSummary, CancelHandle, ItemOutcome,
    ItemProcessor, Processed, ProgressEvent, ScrapeResult, SkipReason, WorkItem,
};

/// Top-level error type for FilmSleuth operations
#[derive(Debug, Error)]
pub enum FilmSleuthError {
    /// Error while loading configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error during cache operations
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error in the HTTP layer
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error reported by a metadata provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error while scraping
    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),
}

/// Builds the shared fetch cache for `options`
///
/// With `persistent` set, fetched documents are mirrored to the platform
/// cache directory and survive between runs.
pub fn open_fetch_cache(
    options: &ScrapeOptions,
    persistent: bool,
) -> Result<Arc<FetchCache>, FilmSleuthError> {
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new(options.fetch_timeout())?);
    let cache = if persistent {
        FetchCache::persistent(fetcher)?
    } else {
        FetchCache::new(fetcher)
    };
    Ok(Arc::new(cache.with_ttl(options.cache_ttl())))
}

/// Scrapes a batch of items with the given providers
///
/// Runs `options.concurrency` workers on `scheduler` and blocks until every
/// item has been processed or the batch was cancelled through `scheduler`'s
/// [`CancelHandle`]. Items are returned in their original order inside the
/// report; unscraped items are returned untouched.
///
/// # Examples
///
/// ```no_run
/// use film_sleuth::{
///     BatchScheduler, ProgressEvent, ProviderRegistry, ScrapeOptions, WorkItem,
///     open_fetch_cache, scrape_batch,
/// };
///
/// let options = ScrapeOptions {
///     tmdb_api_key: Some("key".to_string()),
///     ..Default::default()
/// };
/// let cache = open_fetch_cache(&options, true).unwrap();
/// let registry = ProviderRegistry::with_builtin_providers(cache, &options);
/// let scheduler = BatchScheduler::new();
///
/// let report = scrape_batch(
///     &registry,
///     &scheduler,
///     vec![WorkItem::new("Brave").with_year(Some(2012))],
///     options,
///     |event| {
///         if let ProgressEvent::ItemScraped { name, title, .. } = event {
///             println!("{} -> {}", name, title);
///         }
///     },
/// )
/// .unwrap();
/// assert_eq!(report.summary.total, 1);
/// ```
pub fn scrape_batch<F>(
    registry: &ProviderRegistry,
    scheduler: &BatchScheduler,
    items: Vec<WorkItem>,
    options: ScrapeOptions,
    progress_callback: F,
) -> Result<BatchReport, FilmSleuthError>
where
    F: Fn(ProgressEvent) + Sync,
{
    let concurrency = options.effective_concurrency();
    let pipeline = ScrapePipeline::from_registry(registry, options)?;
    Ok(scheduler.run(items, concurrency, &pipeline, progress_callback))
}
