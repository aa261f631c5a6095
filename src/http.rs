//! HTTP transport used by the fetch cache
//!
//! The [`HttpFetcher`] trait is the only place network reads happen. The
//! default implementation uses a blocking `reqwest` client with a
//! per-request timeout so a stuck provider cannot stall a worker forever.

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while fetching a URL
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The request could not be sent or the body could not be read
    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },
}

impl FetchError {
    /// Returns the HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Transport capable of retrieving a document body for a URL
pub trait HttpFetcher: Send + Sync {
    /// Performs a GET request and returns the body as text
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError>;
}

/// [`HttpFetcher`] backed by a blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        debug!(url = %redact_url(url), "fetching");

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().map_err(|e| FetchError::Request {
            url: redact_url(url),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: redact_url(url),
                status: response.status().as_u16(),
            });
        }

        response.text().map_err(|e| FetchError::Request {
            url: redact_url(url),
            source: e,
        })
    }
}

/// Builds an `Accept-Language` header value for the preferred language
///
/// Order: `lang-country`, `lang`, then `en-us` and `en` as fallbacks, each
/// further entry weighted 0.1 lower than the previous one.
pub fn accept_language(language: &str, country: &str) -> String {
    let language = language.trim().to_lowercase();
    let country = country.trim().to_lowercase();

    let mut tags: Vec<String> = Vec::new();
    if !language.is_empty() && !country.is_empty() {
        tags.push(format!("{}-{}", language, country));
    }
    if !language.is_empty() {
        tags.push(language.clone());
    }
    for fallback in ["en-us", "en"] {
        if !tags.iter().any(|t| t == fallback) {
            tags.push(fallback.to_string());
        }
    }

    tags.iter()
        .enumerate()
        .map(|(index, tag)| {
            if index == 0 {
                tag.clone()
            } else {
                let quality = 1.0 - 0.1 * index as f32;
                format!("{};q={:.1}", tag, quality.max(0.1))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Strips credentials from a URL before it ends up in logs or errors
pub(crate) fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    if k == "api_key" {
                        (k.into_owned(), "***".to_string())
                    } else {
                        (k.into_owned(), v.into_owned())
                    }
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_language_german() {
        assert_eq!(
            accept_language("de", "DE"),
            "de-de,de;q=0.9,en-us;q=0.8,en;q=0.7"
        );
    }

    #[test]
    fn test_accept_language_english_has_no_duplicates() {
        assert_eq!(accept_language("en", "US"), "en-us,en;q=0.9");
    }

    #[test]
    fn test_accept_language_without_country() {
        assert_eq!(accept_language("fr", ""), "fr,en-us;q=0.9,en;q=0.8");
    }

    #[test]
    fn test_redact_url() {
        let redacted = redact_url("https://api.example.org/3/movie/1?api_key=secret&language=en");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("language=en"));
    }
}
