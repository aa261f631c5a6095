/// fanart.tv API response types for deserialization.
///
/// These structures mirror the JSON response format of the fanart.tv v3 movie endpoint.
use serde::Deserialize;

/// The top-level response from `/v3/movies/{id}`
#[derive(Debug, Default, Deserialize)]
pub(super) struct FanartMovie {
    #[serde(default)]
    pub movieposter: Vec<FanartImage>,
    #[serde(default)]
    pub moviebackground: Vec<FanartImage>,
    #[serde(default)]
    pub moviebanner: Vec<FanartImage>,
    #[serde(default)]
    pub hdmovielogo: Vec<FanartImage>,
    #[serde(default)]
    pub moviedisc: Vec<FanartImage>,
    #[serde(default)]
    pub moviethumb: Vec<FanartImage>,
}

/// A single image entry
#[derive(Debug, Deserialize)]
pub(super) struct FanartImage {
    pub url: String,
    /// Language code; "00" marks language-neutral art
    pub lang: Option<String>,
    /// Vote count, delivered as a string
    pub likes: Option<String>,
}
