/// TMDB metadata provider implementation.
use super::tmdb_types::{
    TmdbFindResult, TmdbImage, TmdbImages, TmdbMovie, TmdbSearchPage, TmdbSearchResult,
    TmdbVideos,
};
use super::{
    Artwork, ArtworkKind, CastMember, CastRole, Certification, CollectionLink, DetailPart,
    DetailRequest, MediaCriteria, MetadataProvider, MetadataRecord, ProviderError,
    SearchCandidate, SearchQuery, Trailer, clean_text, fetch_json, year_from_date,
};
use crate::fetch_cache::FetchCache;
use crate::http::accept_language;
use crate::match_resolver::is_valid_imdb_id;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

const PROVIDER_ID: &str = "tmdb";

/// Search results beyond this are dropped
const MAX_SEARCH_RESULTS: usize = 40;

/// Metadata provider for The Movie Database API.
///
/// This provider serves search, all detail parts, artwork and trailers from
/// https://api.themoviedb.org/3. Primary details are always requested in
/// English so ids, numbers and credits are canonical; supplementary and
/// localized parts use the preferred language.
pub struct TmdbProvider {
    cache: Arc<FetchCache>,
    api_key: Option<String>,
    base_url: String,
    image_base_url: String,
}

impl TmdbProvider {
    /// Creates a new TMDB provider instance.
    pub fn new(cache: Arc<FetchCache>, api_key: Option<String>) -> Self {
        Self {
            cache,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: "https://api.themoviedb.org/3".to_string(),
            image_base_url: "https://image.tmdb.org/t/p".to_string(),
        }
    }

    /// Points the provider at a different API root
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(PROVIDER_ID.to_string()))?;

        let mut url = url::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ProviderError::InvalidData(format!("bad endpoint {}: {}", path, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", api_key);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        language: &str,
        country: &str,
    ) -> Result<T, ProviderError> {
        let accept = accept_language(language, country);
        fetch_json(
            &self.cache,
            PROVIDER_ID,
            url,
            &[("Accept", "application/json"), ("Accept-Language", &accept)],
        )
    }

    /// Maps an IMDb id to a TMDB movie id through the find endpoint
    fn find_by_imdb_id(
        &self,
        imdb_id: &str,
        language: &str,
        country: &str,
    ) -> Result<Option<TmdbSearchResult>, ProviderError> {
        let url = self.endpoint(
            &format!("/find/{}", imdb_id),
            &[("external_source", "imdb_id")],
        )?;
        let found: TmdbFindResult = self.get(&url, language, country)?;
        Ok(found.movie_results.into_iter().next())
    }

    /// Accepts either a numeric TMDB id or an IMDb id
    fn movie_id(&self, id: &str, language: &str, country: &str) -> Result<u64, ProviderError> {
        if let Ok(numeric) = id.trim().parse::<u64>() {
            return Ok(numeric);
        }
        if is_valid_imdb_id(id) {
            return self
                .find_by_imdb_id(id, language, country)?
                .map(|movie| movie.id)
                .ok_or_else(|| ProviderError::NotFound(id.to_string()));
        }
        Err(ProviderError::InvalidData(format!(
            "'{}' is neither a TMDB nor an IMDb id",
            id
        )))
    }

    fn criteria_movie_id(&self, criteria: &MediaCriteria) -> Result<Option<u64>, ProviderError> {
        if let Some(id) = criteria.tmdb_id {
            return Ok(Some(id));
        }
        match criteria.imdb_id.as_deref() {
            Some(imdb_id) if is_valid_imdb_id(imdb_id) => Ok(self
                .find_by_imdb_id(imdb_id, &criteria.language, &criteria.country)?
                .map(|movie| movie.id)),
            _ => Ok(None),
        }
    }

    fn image_url(&self, size: &str, path: &str) -> String {
        format!("{}/{}{}", self.image_base_url, size, path)
    }

    fn convert_search_result(&self, result: TmdbSearchResult) -> SearchCandidate {
        let title = result
            .title
            .or(result.original_title)
            .map(|t| clean_text(&t))
            .unwrap_or_default();

        let mut candidate = SearchCandidate::new(PROVIDER_ID, &result.id.to_string(), &title);
        candidate.year = result.release_date.as_deref().and_then(year_from_date);
        candidate.poster_url = result
            .poster_path
            .as_deref()
            .map(|path| self.image_url("w342", path));
        candidate
    }

    /// Maps the English detail page: ids, numbers, classification and credits
    fn convert_primary(&self, movie: TmdbMovie, country: &str) -> MetadataRecord {
        let mut record = MetadataRecord {
            provider_id: PROVIDER_ID.to_string(),
            imdb_id: movie.imdb_id.filter(|id| is_valid_imdb_id(id)),
            tmdb_id: Some(movie.id),
            title: movie.title.map(|t| clean_text(&t)).unwrap_or_default(),
            original_title: movie
                .original_title
                .map(|t| clean_text(&t))
                .unwrap_or_default(),
            tagline: movie.tagline.map(|t| clean_text(&t)).unwrap_or_default(),
            plot: movie.overview.map(|t| clean_text(&t)).unwrap_or_default(),
            year: movie.release_date.as_deref().and_then(year_from_date),
            release_date: movie.release_date.filter(|d| !d.trim().is_empty()),
            runtime_minutes: movie.runtime.filter(|r| *r > 0),
            rating: movie.vote_average,
            vote_count: movie.vote_count,
            top250: None,
            countries: movie
                .production_countries
                .into_iter()
                .map(|c| c.iso_3166_1)
                .collect(),
            spoken_languages: movie
                .spoken_languages
                .into_iter()
                .map(|l| l.iso_639_1)
                .collect(),
            certifications: Vec::new(),
            genres: movie.genres.into_iter().map(|g| g.name).collect(),
            cast: Vec::new(),
            production_companies: movie
                .production_companies
                .into_iter()
                .map(|c| c.name)
                .collect(),
            collection: movie.belongs_to_collection.map(|c| CollectionLink {
                id: c.id,
                name: c.name,
            }),
        };

        if let Some(release_dates) = movie.release_dates {
            record.certifications = release_dates
                .results
                .into_iter()
                .filter(|r| r.iso_3166_1.eq_ignore_ascii_case(country))
                .filter_map(|r| {
                    r.release_dates
                        .into_iter()
                        .filter_map(|d| d.certification)
                        .find(|c| !c.trim().is_empty())
                        .map(|label| Certification {
                            country: r.iso_3166_1,
                            label,
                        })
                })
                .collect();
        }

        if let Some(credits) = movie.credits {
            for crew in credits.crew {
                let role = match (crew.job.as_deref(), crew.department.as_deref()) {
                    (Some("Director"), _) => CastRole::Director,
                    (Some("Producer"), _) => CastRole::Producer,
                    (_, Some("Writing")) => CastRole::Writer,
                    _ => continue,
                };
                record.cast.push(CastMember {
                    role,
                    name: crew.name,
                    part: crew.job,
                    image_url: crew.profile_path.map(|p| self.image_url("w185", &p)),
                });
            }
            for actor in credits.cast {
                record.cast.push(CastMember {
                    role: CastRole::Actor,
                    name: actor.name,
                    part: actor.character.filter(|c| !c.trim().is_empty()),
                    image_url: actor.profile_path.map(|p| self.image_url("w185", &p)),
                });
            }
        }

        record
    }

    /// Maps the preferred-language page onto plot and tagline only
    fn convert_supplementary(movie: TmdbMovie) -> MetadataRecord {
        MetadataRecord {
            provider_id: PROVIDER_ID.to_string(),
            tmdb_id: Some(movie.id),
            plot: movie.overview.map(|t| clean_text(&t)).unwrap_or_default(),
            tagline: movie.tagline.map(|t| clean_text(&t)).unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Maps the preferred-language page onto the fields enrichment may overwrite
    fn convert_localized(movie: TmdbMovie) -> MetadataRecord {
        MetadataRecord {
            provider_id: PROVIDER_ID.to_string(),
            imdb_id: movie.imdb_id.filter(|id| is_valid_imdb_id(id)),
            tmdb_id: Some(movie.id),
            title: movie.title.map(|t| clean_text(&t)).unwrap_or_default(),
            original_title: movie
                .original_title
                .map(|t| clean_text(&t))
                .unwrap_or_default(),
            tagline: movie.tagline.map(|t| clean_text(&t)).unwrap_or_default(),
            plot: movie.overview.map(|t| clean_text(&t)).unwrap_or_default(),
            collection: movie.belongs_to_collection.map(|c| CollectionLink {
                id: c.id,
                name: c.name,
            }),
            ..Default::default()
        }
    }

    fn convert_image(&self, image: TmdbImage, kind: ArtworkKind) -> Artwork {
        Artwork {
            provider_id: PROVIDER_ID.to_string(),
            kind,
            url: self.image_url("original", &image.file_path),
            preview_url: Some(self.image_url("w342", &image.file_path)),
            language: image.iso_639_1,
            width: image.width,
            height: image.height,
        }
    }
}

/// Language tag in the form TMDB expects, e.g. "de-DE"
fn tmdb_language(language: &str, country: &str) -> String {
    if country.trim().is_empty() {
        language.to_lowercase()
    } else {
        format!("{}-{}", language.to_lowercase(), country.to_uppercase())
    }
}

/// Sort rank for artwork: preferred language, English, language-neutral, rest
fn language_rank(language: Option<&str>, preferred: &str) -> u8 {
    match language {
        Some(lang) if lang.eq_ignore_ascii_case(preferred) => 0,
        Some(lang) if lang.eq_ignore_ascii_case("en") => 1,
        None => 2,
        Some(_) => 3,
    }
}

impl MetadataProvider for TmdbProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, ProviderError> {
        // An IMDb id resolves to exactly one canonical title.
        if let Some(imdb_id) = query.imdb_id.as_deref().filter(|id| is_valid_imdb_id(id)) {
            if let Some(result) = self.find_by_imdb_id(imdb_id, &query.language, &query.country)? {
                let mut candidate = self.convert_search_result(result);
                candidate.imdb_id = Some(imdb_id.to_string());
                candidate.score = Some(1.0);
                return Ok(vec![candidate]);
            }
        }

        if query.query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let language = tmdb_language(&query.language, &query.country);
        let year = query.year.filter(|y| *y > 0).map(|y| y.to_string());
        let mut params = vec![
            ("query", query.query.as_str()),
            ("language", language.as_str()),
            ("include_adult", "false"),
        ];
        if let Some(year) = year.as_deref() {
            params.push(("year", year));
        }

        let url = self.endpoint("/search/movie", &params)?;
        let page: TmdbSearchPage = self.get(&url, &query.language, &query.country)?;
        debug!(query = %query.query, count = page.results.len(), "TMDB search results");

        Ok(page
            .results
            .into_iter()
            .filter(|r| !r.adult)
            .take(MAX_SEARCH_RESULTS)
            .map(|r| self.convert_search_result(r))
            .filter(|c| !c.title.is_empty())
            .collect())
    }

    fn fetch_metadata(&self, request: &DetailRequest) -> Result<MetadataRecord, ProviderError> {
        let movie_id = self.movie_id(&request.id, &request.language, &request.country)?;
        let path = format!("/movie/{}", movie_id);

        match request.part {
            DetailPart::Primary => {
                let url = self.endpoint(
                    &path,
                    &[
                        ("language", "en-US"),
                        ("append_to_response", "credits,release_dates"),
                    ],
                )?;
                let movie: TmdbMovie = self.get(&url, "en", "US")?;
                Ok(self.convert_primary(movie, &request.country))
            }
            DetailPart::Supplementary | DetailPart::Localized => {
                let language = tmdb_language(&request.language, &request.country);
                let url = self.endpoint(&path, &[("language", language.as_str())])?;
                let movie: TmdbMovie = self.get(&url, &request.language, &request.country)?;
                Ok(match request.part {
                    DetailPart::Supplementary => Self::convert_supplementary(movie),
                    _ => Self::convert_localized(movie),
                })
            }
        }
    }

    fn fetch_artwork(&self, criteria: &MediaCriteria) -> Result<Vec<Artwork>, ProviderError> {
        let Some(movie_id) = self.criteria_movie_id(criteria)? else {
            debug!(title = %criteria.title, "no TMDB id for artwork lookup");
            return Ok(Vec::new());
        };

        let languages = format!("{},en,null", criteria.language.to_lowercase());
        let url = self.endpoint(
            &format!("/movie/{}/images", movie_id),
            &[("include_image_language", languages.as_str())],
        )?;
        let images: TmdbImages = self.get(&url, &criteria.language, &criteria.country)?;

        let mut artwork = Vec::new();
        if criteria.wants(ArtworkKind::Poster) {
            artwork.extend(
                images
                    .posters
                    .into_iter()
                    .map(|i| self.convert_image(i, ArtworkKind::Poster)),
            );
        }
        if criteria.wants(ArtworkKind::Background) {
            artwork.extend(
                images
                    .backdrops
                    .into_iter()
                    .map(|i| self.convert_image(i, ArtworkKind::Background)),
            );
        }

        artwork.sort_by_key(|a| language_rank(a.language.as_deref(), &criteria.language));
        Ok(artwork)
    }

    fn fetch_trailers(&self, criteria: &MediaCriteria) -> Result<Vec<Trailer>, ProviderError> {
        let Some(movie_id) = self.criteria_movie_id(criteria)? else {
            return Ok(Vec::new());
        };

        let mut languages = vec![tmdb_language(&criteria.language, &criteria.country)];
        if !criteria.language.eq_ignore_ascii_case("en") {
            languages.push("en-US".to_string());
        }

        let mut trailers: Vec<Trailer> = Vec::new();
        for language in &languages {
            let url = self.endpoint(
                &format!("/movie/{}/videos", movie_id),
                &[("language", language.as_str())],
            )?;
            let videos: TmdbVideos = self.get(&url, &criteria.language, &criteria.country)?;

            for video in videos.results {
                if !matches!(video.kind.as_deref(), Some("Trailer") | Some("Teaser")) {
                    continue;
                }
                let url = match video.site.as_str() {
                    "YouTube" => format!("https://www.youtube.com/watch?v={}", video.key),
                    "Vimeo" => format!("https://vimeo.com/{}", video.key),
                    _ => continue,
                };
                if trailers.iter().any(|t| t.url == url) {
                    continue;
                }
                trailers.push(Trailer {
                    provider_id: PROVIDER_ID.to_string(),
                    name: video.name.unwrap_or_else(|| "Trailer".to_string()),
                    url,
                    site: video.site,
                    quality: video.size.map(|s| format!("{}p", s)),
                    language: video.iso_639_1,
                });
            }
        }

        Ok(trailers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FetchError, HttpFetcher};

    /// Answers by URL path with canned TMDB payloads
    struct CannedTmdb;

    impl HttpFetcher for CannedTmdb {
        fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<String, FetchError> {
            let path = url::Url::parse(url).unwrap().path().to_string();
            let body = match path.as_str() {
                "/3/search/movie" => {
                    r#"{"results": [
                        {"id": 62177, "title": "Brave", "release_date": "2012-06-21", "poster_path": "/brave.jpg"},
                        {"id": 5, "title": "Adult Brave", "adult": true},
                        {"id": 9, "title": "Brave Story", "release_date": "2006-07-08"}
                    ]}"#
                }
                "/3/find/tt1217209" => {
                    r#"{"movie_results": [{"id": 62177, "title": "Brave", "release_date": "2012-06-21"}]}"#
                }
                "/3/movie/62177" if url.contains("append_to_response") => {
                    r#"{
                        "id": 62177, "imdb_id": "tt1217209", "title": "Brave",
                        "original_title": "Brave", "tagline": "Change your fate.",
                        "overview": "", "release_date": "2012-06-21", "runtime": 93,
                        "vote_average": 7.0, "vote_count": 15000,
                        "genres": [{"name": "Animation"}, {"name": "Adventure"}],
                        "production_companies": [{"name": "Pixar"}],
                        "production_countries": [{"iso_3166_1": "US"}],
                        "spoken_languages": [{"iso_639_1": "en"}],
                        "belongs_to_collection": null,
                        "credits": {
                            "cast": [{"name": "Kelly Macdonald", "character": "Merida", "profile_path": "/km.jpg"}],
                            "crew": [
                                {"name": "Mark Andrews", "job": "Director", "department": "Directing"},
                                {"name": "Irene Mecchi", "job": "Screenplay", "department": "Writing"},
                                {"name": "Someone", "job": "Editor", "department": "Editing"}
                            ]
                        },
                        "release_dates": {"results": [
                            {"iso_3166_1": "DE", "release_dates": [{"certification": "6"}]},
                            {"iso_3166_1": "US", "release_dates": [{"certification": ""}, {"certification": "PG"}]}
                        ]}
                    }"#
                }
                "/3/movie/62177" => {
                    r#"{"id": 62177, "title": "Merida", "original_title": "Brave",
                        "overview": "Eine Prinzessin...", "tagline": "",
                        "belongs_to_collection": {"id": 1, "name": "Brave Collection"}}"#
                }
                "/3/movie/62177/images" => {
                    r#"{"posters": [
                            {"file_path": "/p-null.jpg", "iso_639_1": null},
                            {"file_path": "/p-en.jpg", "iso_639_1": "en"},
                            {"file_path": "/p-de.jpg", "iso_639_1": "de"}
                        ],
                        "backdrops": [{"file_path": "/b.jpg", "iso_639_1": null, "width": 1920, "height": 1080}]}"#
                }
                "/3/movie/62177/videos" => {
                    r#"{"results": [
                        {"name": "Official Trailer", "key": "abc", "site": "YouTube", "type": "Trailer", "size": 1080},
                        {"name": "Clip", "key": "def", "site": "YouTube", "type": "Clip"}
                    ]}"#
                }
                _ => {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        status: 404,
                    });
                }
            };
            Ok(body.to_string())
        }
    }

    fn provider() -> TmdbProvider {
        let cache = Arc::new(FetchCache::new(Arc::new(CannedTmdb)));
        TmdbProvider::new(cache, Some("key".to_string()))
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            query: text.to_string(),
            year: None,
            imdb_id: None,
            language: "en".to_string(),
            country: "US".to_string(),
        }
    }

    fn detail(part: DetailPart) -> DetailRequest {
        DetailRequest {
            id: "62177".to_string(),
            part,
            language: "de".to_string(),
            country: "DE".to_string(),
        }
    }

    #[test]
    fn test_search_maps_and_filters_adult_titles() {
        let candidates = provider().search(&query("Brave")).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "62177");
        assert_eq!(candidates[0].year, Some(2012));
        assert_eq!(
            candidates[0].poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w342/brave.jpg")
        );
        assert_eq!(candidates[0].score, None);
        assert_eq!(candidates[1].poster_url, None);
    }

    #[test]
    fn test_search_by_imdb_id_is_canonical() {
        let mut q = query("whatever");
        q.imdb_id = Some("tt1217209".to_string());

        let candidates = provider().search(&q).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, Some(1.0));
        assert_eq!(candidates[0].imdb_id.as_deref(), Some("tt1217209"));
    }

    #[test]
    fn test_missing_api_key() {
        let cache = Arc::new(FetchCache::new(Arc::new(CannedTmdb)));
        let provider = TmdbProvider::new(cache, Some("  ".to_string()));
        assert!(matches!(
            provider.search(&query("Brave")),
            Err(ProviderError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_primary_details() {
        let record = provider().fetch_metadata(&detail(DetailPart::Primary)).unwrap();

        assert_eq!(record.title, "Brave");
        assert_eq!(record.imdb_id.as_deref(), Some("tt1217209"));
        assert_eq!(record.runtime_minutes, Some(93));
        assert_eq!(record.genres, vec!["Animation", "Adventure"]);
        assert_eq!(
            record.certifications,
            vec![Certification {
                country: "DE".to_string(),
                label: "6".to_string()
            }]
        );
        let roles: Vec<CastRole> = record.cast.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![CastRole::Director, CastRole::Writer, CastRole::Actor]
        );
        assert_eq!(record.cast[2].part.as_deref(), Some("Merida"));
        assert!(record.plot.is_empty());
    }

    #[test]
    fn test_supplementary_only_carries_plot_and_tagline() {
        let record = provider()
            .fetch_metadata(&detail(DetailPart::Supplementary))
            .unwrap();

        assert_eq!(record.plot, "Eine Prinzessin...");
        assert!(record.title.is_empty());
        assert_eq!(record.collection, None);
    }

    #[test]
    fn test_localized_carries_collection() {
        let record = provider()
            .fetch_metadata(&detail(DetailPart::Localized))
            .unwrap();
        assert_eq!(record.title, "Merida");
        assert_eq!(record.collection.map(|c| c.id), Some(1));
    }

    #[test]
    fn test_details_by_imdb_id() {
        let mut request = detail(DetailPart::Primary);
        request.id = "tt1217209".to_string();
        assert_eq!(
            provider().fetch_metadata(&request).unwrap().tmdb_id,
            Some(62177)
        );
    }

    #[test]
    fn test_artwork_is_ordered_by_language() {
        let criteria = MediaCriteria {
            tmdb_id: Some(62177),
            language: "de".to_string(),
            country: "DE".to_string(),
            ..Default::default()
        };
        let artwork = provider().fetch_artwork(&criteria).unwrap();

        let languages: Vec<Option<&str>> =
            artwork.iter().map(|a| a.language.as_deref()).collect();
        assert_eq!(languages, vec![Some("de"), Some("en"), None, None]);
        assert_eq!(artwork[3].kind, ArtworkKind::Background);
    }

    #[test]
    fn test_artwork_without_ids_is_empty() {
        let artwork = provider().fetch_artwork(&MediaCriteria::default()).unwrap();
        assert!(artwork.is_empty());
    }

    #[test]
    fn test_trailers_keep_only_trailers_and_teasers() {
        let criteria = MediaCriteria {
            tmdb_id: Some(62177),
            language: "en".to_string(),
            country: "US".to_string(),
            ..Default::default()
        };
        let trailers = provider().fetch_trailers(&criteria).unwrap();

        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers[0].url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(trailers[0].quality.as_deref(), Some("1080p"));
    }
}
