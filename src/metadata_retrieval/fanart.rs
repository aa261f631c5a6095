/// fanart.tv artwork provider implementation.
use super::fanart_types::{FanartImage, FanartMovie};
use super::{Artwork, ArtworkKind, MediaCriteria, MetadataProvider, ProviderError, fetch_json};
use crate::fetch_cache::FetchCache;
use crate::match_resolver::is_valid_imdb_id;
use std::sync::Arc;
use tracing::debug;

const PROVIDER_ID: &str = "fanarttv";

/// Artwork-only provider for https://webservice.fanart.tv
///
/// Lookups are keyed by TMDB id when known, otherwise by IMDb id.
pub struct FanartTvProvider {
    cache: Arc<FetchCache>,
    api_key: Option<String>,
    base_url: String,
}

impl FanartTvProvider {
    /// Creates a new fanart.tv provider instance.
    pub fn new(cache: Arc<FetchCache>, api_key: Option<String>) -> Self {
        Self {
            cache,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: "https://webservice.fanart.tv/v3".to_string(),
        }
    }

    fn lookup_id(criteria: &MediaCriteria) -> Option<String> {
        criteria.tmdb_id.map(|id| id.to_string()).or_else(|| {
            criteria
                .imdb_id
                .clone()
                .filter(|id| is_valid_imdb_id(id))
        })
    }

    fn convert_images(
        images: Vec<FanartImage>,
        kind: ArtworkKind,
        criteria: &MediaCriteria,
    ) -> Vec<Artwork> {
        if !criteria.wants(kind) {
            return Vec::new();
        }

        let mut images: Vec<(u32, Artwork)> = images
            .into_iter()
            .map(|image| {
                let likes = image
                    .likes
                    .as_deref()
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(0);
                let language = image.lang.filter(|l| !l.is_empty() && l != "00");
                let artwork = Artwork {
                    provider_id: PROVIDER_ID.to_string(),
                    kind,
                    preview_url: Some(image.url.replace("/fanart/", "/preview/")),
                    url: image.url,
                    language,
                    width: None,
                    height: None,
                };
                (likes, artwork)
            })
            .collect();

        // Preferred language first, then by votes.
        images.sort_by(|(likes_a, a), (likes_b, b)| {
            let preferred = |art: &Artwork| {
                art.language
                    .as_deref()
                    .is_some_and(|l| l.eq_ignore_ascii_case(&criteria.language))
            };
            preferred(b)
                .cmp(&preferred(a))
                .then(likes_b.cmp(likes_a))
        });

        images.into_iter().map(|(_, artwork)| artwork).collect()
    }
}

impl MetadataProvider for FanartTvProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn fetch_artwork(&self, criteria: &MediaCriteria) -> Result<Vec<Artwork>, ProviderError> {
        let Some(id) = Self::lookup_id(criteria) else {
            debug!(title = %criteria.title, "no id usable for fanart.tv");
            return Ok(Vec::new());
        };
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(PROVIDER_ID.to_string()))?;

        let mut url = url::Url::parse(&format!("{}/movies/{}", self.base_url, id))
            .map_err(|e| ProviderError::InvalidData(e.to_string()))?;
        url.query_pairs_mut().append_pair("api_key", api_key);

        let movie: FanartMovie = match fetch_json(&self.cache, PROVIDER_ID, url.as_str(), &[]) {
            Ok(movie) => movie,
            // fanart.tv answers 404 for titles without any art.
            Err(ProviderError::Request(e)) if e.status() == Some(404) => FanartMovie::default(),
            Err(e) => return Err(e),
        };

        let mut artwork = Vec::new();
        artwork.extend(Self::convert_images(movie.movieposter, ArtworkKind::Poster, criteria));
        artwork.extend(Self::convert_images(
            movie.moviebackground,
            ArtworkKind::Background,
            criteria,
        ));
        artwork.extend(Self::convert_images(movie.moviebanner, ArtworkKind::Banner, criteria));
        artwork.extend(Self::convert_images(movie.hdmovielogo, ArtworkKind::Logo, criteria));
        artwork.extend(Self::convert_images(movie.moviedisc, ArtworkKind::Disc, criteria));
        artwork.extend(Self::convert_images(movie.moviethumb, ArtworkKind::Thumb, criteria));

        Ok(artwork)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FetchError, HttpFetcher};

    struct CannedFanart;

    impl HttpFetcher for CannedFanart {
        fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<String, FetchError> {
            if url.contains("/movies/62177") {
                Ok(r#"{
                    "movieposter": [
                        {"url": "https://assets.fanart.tv/fanart/movies/62177/movieposter/a.jpg", "lang": "en", "likes": "3"},
                        {"url": "https://assets.fanart.tv/fanart/movies/62177/movieposter/b.jpg", "lang": "de", "likes": "1"},
                        {"url": "https://assets.fanart.tv/fanart/movies/62177/movieposter/c.jpg", "lang": "en", "likes": "9"}
                    ],
                    "hdmovielogo": [
                        {"url": "https://assets.fanart.tv/fanart/movies/62177/hdmovielogo/l.png", "lang": "00", "likes": "0"}
                    ]
                }"#
                .to_string())
            } else {
                Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                })
            }
        }
    }

    fn provider() -> FanartTvProvider {
        FanartTvProvider::new(
            Arc::new(FetchCache::new(Arc::new(CannedFanart))),
            Some("key".to_string()),
        )
    }

    fn criteria(tmdb_id: u64, language: &str) -> MediaCriteria {
        MediaCriteria {
            tmdb_id: Some(tmdb_id),
            language: language.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_posters_ordered_by_language_then_likes() {
        let artwork = provider().fetch_artwork(&criteria(62177, "de")).unwrap();

        let names: Vec<&str> = artwork
            .iter()
            .map(|a| a.url.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["b.jpg", "c.jpg", "a.jpg", "l.png"]);
        assert_eq!(artwork[3].kind, ArtworkKind::Logo);
        assert_eq!(artwork[3].language, None);
        assert!(artwork[0].preview_url.as_deref().unwrap().contains("/preview/"));
    }

    #[test]
    fn test_kind_filter() {
        let mut c = criteria(62177, "en");
        c.kinds = vec![ArtworkKind::Logo];
        let artwork = provider().fetch_artwork(&c).unwrap();
        assert_eq!(artwork.len(), 1);
    }

    #[test]
    fn test_unknown_title_is_empty_not_an_error() {
        let artwork = provider().fetch_artwork(&criteria(1, "en")).unwrap();
        assert!(artwork.is_empty());
    }

    #[test]
    fn test_search_is_unsupported() {
        let query = crate::metadata_retrieval::SearchQuery {
            query: "Brave".to_string(),
            year: None,
            imdb_id: None,
            language: "en".to_string(),
            country: "US".to_string(),
        };
        assert!(matches!(
            provider().search(&query),
            Err(ProviderError::Unsupported { .. })
        ));
    }
}
