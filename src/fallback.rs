//! Provider fallback chains for artwork and trailers
//!
//! Artwork needs one good source: providers are asked in order and the first
//! non-empty answer wins. Trailers benefit from more options: every provider
//! is asked and all answers are concatenated. In both chains a failing
//! provider contributes nothing and never stops the chain.

use crate::metadata_retrieval::{Artwork, MediaCriteria, MetadataProvider, ProviderError, Trailer};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a fallback chain
#[derive(Debug)]
pub struct FallbackResult<T> {
    pub items: Vec<T>,
    /// Provider whose answer was used (artwork chain only)
    pub source: Option<String>,
    /// Providers that failed, in the order they were asked
    pub failures: Vec<(String, ProviderError)>,
}

impl<T> Default for FallbackResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            source: None,
            failures: Vec::new(),
        }
    }
}

impl<T> FallbackResult<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Returns the artwork of the first provider that yields any
pub fn collect_artwork(
    criteria: &MediaCriteria,
    providers: &[Arc<dyn MetadataProvider>],
) -> FallbackResult<Artwork> {
    let mut result = FallbackResult::default();

    for provider in providers {
        match provider.fetch_artwork(criteria) {
            Ok(artwork) if !artwork.is_empty() => {
                debug!(provider = provider.id(), count = artwork.len(), "artwork found");
                result.items = artwork;
                result.source = Some(provider.id().to_string());
                break;
            }
            Ok(_) => debug!(provider = provider.id(), "no artwork, trying next provider"),
            Err(e) => {
                warn!(provider = provider.id(), error = %e, "artwork lookup failed, trying next provider");
                result.failures.push((provider.id().to_string(), e));
            }
        }
    }

    result
}

/// Concatenates the trailers of every provider, in provider order
pub fn collect_trailers(
    criteria: &MediaCriteria,
    providers: &[Arc<dyn MetadataProvider>],
) -> FallbackResult<Trailer> {
    let mut result = FallbackResult::default();

    for provider in providers {
        match provider.fetch_trailers(criteria) {
            Ok(trailers) => {
                debug!(provider = provider.id(), count = trailers.len(), "trailers fetched");
                result.items.extend(trailers);
            }
            Err(e) => {
                warn!(provider = provider.id(), error = %e, "trailer lookup failed");
                result.failures.push((provider.id().to_string(), e));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_retrieval::ArtworkKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with fixed URLs, or fails when `urls` is `None`
    struct Canned {
        id: &'static str,
        urls: Option<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    fn canned(id: &'static str, urls: Option<Vec<&'static str>>) -> Arc<Canned> {
        Arc::new(Canned {
            id,
            urls,
            calls: AtomicUsize::new(0),
        })
    }

    impl Canned {
        fn answer<T>(&self, make: impl Fn(&str) -> T) -> Result<Vec<T>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.urls {
                Some(urls) => Ok(urls.iter().map(|url| make(url)).collect()),
                None => Err(ProviderError::NotFound(self.id.to_string())),
            }
        }
    }

    impl MetadataProvider for Canned {
        fn id(&self) -> &str {
            self.id
        }

        fn fetch_artwork(&self, _criteria: &MediaCriteria) -> Result<Vec<Artwork>, ProviderError> {
            self.answer(|url| Artwork {
                provider_id: self.id.to_string(),
                kind: ArtworkKind::Poster,
                url: url.to_string(),
                preview_url: None,
                language: None,
                width: None,
                height: None,
            })
        }

        fn fetch_trailers(&self, _criteria: &MediaCriteria) -> Result<Vec<Trailer>, ProviderError> {
            self.answer(|url| Trailer {
                provider_id: self.id.to_string(),
                name: url.to_string(),
                url: url.to_string(),
                site: "YouTube".to_string(),
                quality: None,
                language: None,
            })
        }
    }

    fn as_providers(list: &[Arc<Canned>]) -> Vec<Arc<dyn MetadataProvider>> {
        list.iter()
            .map(|p| Arc::clone(p) as Arc<dyn MetadataProvider>)
            .collect()
    }

    #[test]
    fn test_artwork_first_non_empty_wins() {
        let providers = [
            canned("a", Some(vec![])),
            canned("b", Some(vec!["x"])),
            canned("c", Some(vec!["y"])),
        ];

        let result = collect_artwork(&MediaCriteria::default(), &as_providers(&providers));
        let urls: Vec<&str> = result.items.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["x"]);
        assert_eq!(result.source.as_deref(), Some("b"));
        assert_eq!(providers[2].calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_artwork_failure_falls_through() {
        let providers = [canned("a", None), canned("b", Some(vec!["x"]))];

        let result = collect_artwork(&MediaCriteria::default(), &as_providers(&providers));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].0, "a");
    }

    #[test]
    fn test_artwork_empty_when_all_fail_or_are_empty() {
        let providers = [canned("a", None), canned("b", Some(vec![]))];

        let result = collect_artwork(&MediaCriteria::default(), &as_providers(&providers));
        assert!(result.is_empty());
        assert_eq!(result.source, None);
    }

    #[test]
    fn test_trailers_accumulate_past_failures() {
        let providers = [
            canned("a", Some(vec!["t1"])),
            canned("b", None),
            canned("c", Some(vec!["t2"])),
        ];

        let result = collect_trailers(&MediaCriteria::default(), &as_providers(&providers));
        let names: Vec<&str> = result.items.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
        assert_eq!(result.failures.len(), 1);
    }
}
