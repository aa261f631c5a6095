//! Match resolution module
//!
//! Turns a free-text title (plus optional id and year hints) into at most one
//! committed search candidate. Candidates are ranked by a normalized string
//! similarity; when two candidates tie at a perfect score the title is not
//! unique and the resolver abstains instead of guessing.

use crate::metadata_retrieval::{MetadataProvider, ProviderError, SearchCandidate, SearchQuery};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Score deduction for a missing poster or a disagreeing year
pub const SCORE_PENALTY: f64 = 0.01;

static IMDB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tt\d{7,8}$").expect("static regex is valid"));

/// Whether `id` is a syntactically valid IMDb id (e.g. "tt1217209")
pub fn is_valid_imdb_id(id: &str) -> bool {
    IMDB_ID.is_match(id.trim())
}

/// Removes everything but letters, digits and single spaces, lowercased
pub fn clean_search_term(term: &str) -> String {
    term.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized similarity of two titles in [0, 1]
pub fn title_similarity(query: &str, title: &str) -> f64 {
    strsim::normalized_levenshtein(&clean_search_term(query), &clean_search_term(title))
}

/// Identity hints for one lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchHints {
    pub name: String,
    pub external_id: Option<String>,
    pub year: Option<u32>,
}

/// Scores a candidate against the hints
///
/// An id match is always a perfect score. Otherwise the title similarity is
/// reduced by [`SCORE_PENALTY`] for a missing or placeholder poster and again
/// for a year hint that disagrees with the candidate.
pub fn score_candidate(candidate: &SearchCandidate, hints: &MatchHints, language: &str) -> f64 {
    if matches_id_hint(candidate, hints) {
        return 1.0;
    }

    let mut score = title_similarity(&hints.name, candidate.display_title(language));

    let has_poster = candidate
        .poster_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty() && !url.contains("nopicture"));
    if !has_poster {
        score -= SCORE_PENALTY;
    }

    if let Some(year) = hints.year.filter(|y| *y != 0) {
        if candidate.year != Some(year) {
            score -= SCORE_PENALTY;
        }
    }

    score.clamp(0.0, 1.0)
}

fn matches_id_hint(candidate: &SearchCandidate, hints: &MatchHints) -> bool {
    hints
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .is_some_and(|hint| candidate.id == hint || candidate.imdb_id.as_deref() == Some(hint))
}

/// Scores unscored candidates and sorts by descending score
///
/// A candidate matching the id hint scores 1.0 even if the provider already
/// scored it. The sort is stable, so equal scores keep the provider's order.
pub fn rank_candidates(
    mut candidates: Vec<SearchCandidate>,
    hints: &MatchHints,
    language: &str,
) -> Vec<SearchCandidate> {
    for candidate in &mut candidates {
        let score = if matches_id_hint(candidate, hints) {
            1.0
        } else {
            match candidate.score {
                Some(score) => score.clamp(0.0, 1.0),
                None => score_candidate(candidate, hints, language),
            }
        };
        candidate.score = Some(score);
    }

    candidates.sort_by(|a, b| b.score_or_zero().total_cmp(&a.score_or_zero()));
    candidates
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The id hint was valid; the caller should fetch details directly
    Direct(SearchCandidate),
    /// The best-ranked search candidate
    Matched(SearchCandidate),
    /// Two or more candidates scored a perfect 1.0
    Ambiguous { perfect_matches: usize },
    /// The search returned nothing
    NoMatch,
}

impl Resolution {
    /// The committed candidate, if any
    pub fn candidate(self) -> Option<SearchCandidate> {
        match self {
            Resolution::Direct(candidate) | Resolution::Matched(candidate) => Some(candidate),
            Resolution::Ambiguous { .. } | Resolution::NoMatch => None,
        }
    }
}

/// Picks the winner from an already ranked list
pub fn select_match(ranked: Vec<SearchCandidate>) -> Resolution {
    let perfect = |c: &SearchCandidate| c.score_or_zero() == 1.0;

    match ranked.as_slice() {
        [] => Resolution::NoMatch,
        [first, second, ..] if perfect(first) && perfect(second) => Resolution::Ambiguous {
            perfect_matches: ranked.iter().filter(|c| perfect(c)).count(),
        },
        _ => ranked
            .into_iter()
            .next()
            .map(Resolution::Matched)
            .unwrap_or(Resolution::NoMatch),
    }
}

/// Resolves titles against one provider
pub struct MatchResolver<'a> {
    provider: &'a dyn MetadataProvider,
    language: String,
    country: String,
}

impl<'a> MatchResolver<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, language: &str, country: &str) -> Self {
        Self {
            provider,
            language: language.to_string(),
            country: country.to_string(),
        }
    }

    /// Resolves the hints to a committed candidate or an abstention
    ///
    /// Provider errors are not swallowed; the caller decides how to skip.
    pub fn resolve(&self, hints: &MatchHints) -> Result<Resolution, ProviderError> {
        if let Some(id) = hints.external_id.as_deref().filter(|id| is_valid_imdb_id(id)) {
            let id = id.trim();
            debug!(imdb_id = %id, "valid external id, skipping search");
            let mut candidate = SearchCandidate::new(self.provider.id(), id, &hints.name);
            candidate.imdb_id = Some(id.to_string());
            candidate.year = hints.year;
            candidate.score = Some(1.0);
            return Ok(Resolution::Direct(candidate));
        }

        let ranked = self.rank(hints)?;
        if let Some(best) = ranked.first() {
            debug!(
                name = %hints.name,
                best = %best.title,
                score = best.score_or_zero(),
                count = ranked.len(),
                "ranked candidates"
            );
        }

        Ok(select_match(ranked))
    }

    /// Searches by name and returns all candidates, best first
    ///
    /// A valid IMDb id hint is passed along so the provider can look the
    /// title up canonically.
    pub fn rank(&self, hints: &MatchHints) -> Result<Vec<SearchCandidate>, ProviderError> {
        let query = SearchQuery {
            query: clean_search_term(&hints.name),
            year: hints.year,
            imdb_id: hints
                .external_id
                .as_deref()
                .map(str::trim)
                .filter(|id| is_valid_imdb_id(id))
                .map(str::to_string),
            language: self.language.clone(),
            country: self.country.clone(),
        };

        let candidates = self.provider.search(&query)?;
        Ok(rank_candidates(candidates, hints, &self.language))
    }
}
