//! Per-item scrape pipeline
//!
//! resolve -> aggregate -> artwork chain -> trailer chain. Providers are
//! picked from a [`ProviderRegistry`] by the ids configured in
//! [`ScrapeOptions`].

use crate::aggregator::MetadataAggregator;
use crate::config::ScrapeOptions;
use crate::fallback::{collect_artwork, collect_trailers};
use crate::match_resolver::{MatchHints, MatchResolver, Resolution};
use crate::metadata_retrieval::{MediaCriteria, MetadataProvider, ProviderRegistry};
use crate::scheduler::{ItemProcessor, Processed, ScrapeError, ScrapeResult, SkipReason, WorkItem};
use std::sync::Arc;
use tracing::{debug, warn};

/// Scrapes single work items with a fixed provider set
pub struct ScrapePipeline {
    metadata: Arc<dyn MetadataProvider>,
    enrichment: Option<Arc<dyn MetadataProvider>>,
    artwork: Vec<Arc<dyn MetadataProvider>>,
    trailers: Vec<Arc<dyn MetadataProvider>>,
    options: ScrapeOptions,
}

impl ScrapePipeline {
    /// Wires the pipeline from configured provider ids
    ///
    /// The metadata provider is required. An unknown enrichment provider only
    /// disables enrichment, and unknown artwork or trailer providers are
    /// skipped.
    pub fn from_registry(
        registry: &ProviderRegistry,
        options: ScrapeOptions,
    ) -> Result<Self, ScrapeError> {
        let metadata = registry
            .get(&options.metadata_provider)
            .ok_or_else(|| ScrapeError::UnknownProvider(options.metadata_provider.clone()))?;
        let enrichment = registry.get(&options.enrichment_provider);
        if enrichment.is_none() && options.wants_enrichment() {
            warn!(
                provider = %options.enrichment_provider,
                "enrichment provider not registered, enrichment disabled"
            );
        }

        Ok(Self {
            metadata,
            enrichment,
            artwork: registry.ordered(&options.artwork_providers),
            trailers: registry.ordered(&options.trailer_providers),
            options,
        })
    }

    pub fn options(&self) -> &ScrapeOptions {
        &self.options
    }

    /// Resolver bound to the metadata provider and preferred locale
    pub fn resolver(&self) -> MatchResolver<'_> {
        MatchResolver::new(
            self.metadata.as_ref(),
            &self.options.preferred_language,
            &self.options.preferred_country,
        )
    }
}

impl ItemProcessor for ScrapePipeline {
    fn process(&self, item: &WorkItem) -> Result<Processed, ScrapeError> {
        let hints = MatchHints {
            name: item.name.clone(),
            external_id: item.external_id.clone(),
            year: item.year,
        };

        let candidate = match self.resolver().resolve(&hints).map_err(ScrapeError::Search)? {
            Resolution::Direct(candidate) | Resolution::Matched(candidate) => candidate,
            Resolution::Ambiguous { perfect_matches } => {
                return Ok(Processed::Skipped(SkipReason::Ambiguous { perfect_matches }));
            }
            Resolution::NoMatch => return Ok(Processed::Skipped(SkipReason::NoMatch)),
        };
        debug!(item = %item.name, id = %candidate.id, "committed to candidate");

        let aggregator = MetadataAggregator::new(
            self.metadata.as_ref(),
            self.enrichment.as_deref(),
            &self.options,
        );
        let mut metadata = aggregator.aggregate(&candidate)?;
        if metadata.imdb_id.is_none() {
            metadata.imdb_id = candidate.imdb_id.clone();
        }

        let criteria = MediaCriteria::from_record(
            &metadata,
            &self.options.preferred_language,
            &self.options.preferred_country,
        );
        let artwork = collect_artwork(&criteria, &self.artwork).items;
        let trailers = collect_trailers(&criteria, &self.trailers).items;

        Ok(Processed::Scraped(ScrapeResult {
            metadata,
            artwork,
            trailers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl MetadataProvider for Nothing {
        fn id(&self) -> &str {
            "nothing"
        }
    }

    #[test]
    fn test_unknown_metadata_provider() {
        let options = ScrapeOptions {
            metadata_provider: "missing".to_string(),
            ..Default::default()
        };
        let result = ScrapePipeline::from_registry(&ProviderRegistry::new(), options);
        assert!(matches!(result, Err(ScrapeError::UnknownProvider(id)) if id == "missing"));
    }

    #[test]
    fn test_unsupported_search_fails_the_item() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Nothing));
        let options = ScrapeOptions {
            metadata_provider: "nothing".to_string(),
            ..Default::default()
        };

        let pipeline = ScrapePipeline::from_registry(&registry, options).unwrap();
        assert!(matches!(
            pipeline.process(&WorkItem::new("Brave")),
            Err(ScrapeError::Search(_))
        ));
    }
}
