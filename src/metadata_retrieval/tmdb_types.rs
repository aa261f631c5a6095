/// TMDB API response types for deserialization.
///
/// These structures mirror the JSON response format of The Movie Database v3 API.
/// Every field that TMDB may send as `null` or omit is optional.
use serde::Deserialize;

/// Response of `/search/movie`
#[derive(Debug, Deserialize)]
pub(super) struct TmdbSearchPage {
    #[serde(default)]
    pub results: Vec<TmdbSearchResult>,
}

/// One entry of a search page
#[derive(Debug, Deserialize)]
pub(super) struct TmdbSearchResult {
    pub id: u64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub adult: bool,
}

/// Response of `/find/{external_id}`
#[derive(Debug, Deserialize)]
pub(super) struct TmdbFindResult {
    #[serde(default)]
    pub movie_results: Vec<TmdbSearchResult>,
}

/// Response of `/movie/{id}`, optionally with appended credits and release dates
#[derive(Debug, Deserialize)]
pub(super) struct TmdbMovie {
    pub id: u64,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    #[serde(default)]
    pub genres: Vec<TmdbNamed>,
    #[serde(default)]
    pub production_companies: Vec<TmdbNamed>,
    #[serde(default)]
    pub production_countries: Vec<TmdbCountry>,
    #[serde(default)]
    pub spoken_languages: Vec<TmdbLanguage>,
    pub belongs_to_collection: Option<TmdbCollection>,
    pub credits: Option<TmdbCredits>,
    pub release_dates: Option<TmdbReleaseDates>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbNamed {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCountry {
    pub iso_3166_1: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbLanguage {
    pub iso_639_1: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCollection {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastEntry>,
    #[serde(default)]
    pub crew: Vec<TmdbCrewEntry>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCastEntry {
    pub name: String,
    pub character: Option<String>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCrewEntry {
    pub name: String,
    pub job: Option<String>,
    pub department: Option<String>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbReleaseDates {
    #[serde(default)]
    pub results: Vec<TmdbCountryReleases>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbCountryReleases {
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<TmdbRelease>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbRelease {
    pub certification: Option<String>,
}

/// Response of `/movie/{id}/images`
#[derive(Debug, Deserialize)]
pub(super) struct TmdbImages {
    #[serde(default)]
    pub posters: Vec<TmdbImage>,
    #[serde(default)]
    pub backdrops: Vec<TmdbImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbImage {
    pub file_path: String,
    pub iso_639_1: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Response of `/movie/{id}/videos`
#[derive(Debug, Deserialize)]
pub(super) struct TmdbVideos {
    #[serde(default)]
    pub results: Vec<TmdbVideo>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TmdbVideo {
    pub name: Option<String>,
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<u32>,
    pub iso_639_1: Option<String>,
}
