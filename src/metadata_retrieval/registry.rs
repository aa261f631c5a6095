//! Provider registry
//!
//! Maps stable provider ids to provider instances so the scrape pipeline can
//! be wired from configured, ordered id lists instead of fixed references.

use super::{FanartTvProvider, MetadataProvider, TmdbProvider};
use crate::config::ScrapeOptions;
use crate::fetch_cache::FetchCache;
use std::sync::Arc;
use tracing::warn;

/// Ordered set of available providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.id()))
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in provider, sharing one fetch cache
    pub fn with_builtin_providers(cache: Arc<FetchCache>, options: &ScrapeOptions) -> Self {
        if options.tmdb_api_key.is_none() {
            warn!("no TMDB API key configured; searches and TMDB artwork will fail");
        }

        let mut registry = Self::new();
        registry.register(Arc::new(TmdbProvider::new(
            Arc::clone(&cache),
            options.tmdb_api_key.clone(),
        )));
        registry.register(Arc::new(FanartTvProvider::new(
            cache,
            options.fanart_api_key.clone(),
        )));
        registry
    }

    /// Adds a provider, replacing any provider with the same id
    pub fn register(&mut self, provider: Arc<dyn MetadataProvider>) {
        self.providers.retain(|p| p.id() != provider.id());
        self.providers.push(provider);
    }

    /// Looks up a provider by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn MetadataProvider>> {
        self.providers
            .iter()
            .find(|p| p.id().eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Resolves an ordered id list, skipping unknown ids with a warning
    pub fn ordered(&self, ids: &[String]) -> Vec<Arc<dyn MetadataProvider>> {
        ids.iter()
            .filter_map(|id| {
                let provider = self.get(id);
                if provider.is_none() {
                    warn!(provider = %id, "unknown provider in configuration, skipping");
                }
                provider
            })
            .collect()
    }

    /// Ids of all registered providers, in registration order
    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }
}
