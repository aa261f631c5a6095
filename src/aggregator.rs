//! Metadata aggregation
//!
//! For a committed candidate, the primary and supplementary detail pages and
//! the optional enrichment are fetched concurrently, joined, and merged into
//! one [`MetadataRecord`] with a fixed field precedence:
//!
//! 1. primary fields populate the record
//! 2. supplementary fields only fill what is still empty
//! 3. enrichment overwrites localized text when enabled and usable
//!
//! The merge itself is a pure function ([`merge_records`]) so its precedence
//! does not depend on which fetch happened to finish first.

use crate::config::ScrapeOptions;
use crate::metadata_retrieval::{
    DetailPart, DetailRequest, MetadataProvider, MetadataRecord, ProviderError, SearchCandidate,
};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that make aggregation of one item impossible
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The mandatory primary detail fetch failed
    #[error("Primary details for '{id}' could not be fetched: {source}")]
    Primary {
        id: String,
        #[source]
        source: ProviderError,
    },

    /// A fetch worker panicked
    #[error("The {part} fetch for '{id}' panicked")]
    Panicked { id: String, part: &'static str },
}

type Joined = thread::Result<Result<MetadataRecord, ProviderError>>;

/// Assembles records from a metadata provider and an optional enrichment provider
pub struct MetadataAggregator<'a> {
    metadata: &'a dyn MetadataProvider,
    enrichment: Option<&'a dyn MetadataProvider>,
    options: &'a ScrapeOptions,
}

impl<'a> MetadataAggregator<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        enrichment: Option<&'a dyn MetadataProvider>,
        options: &'a ScrapeOptions,
    ) -> Self {
        Self {
            metadata,
            enrichment,
            options,
        }
    }

    /// Builds the unified record for `candidate`
    ///
    /// A candidate that already carries a record is returned as is. Otherwise
    /// all sub-fetches are joined before merging; only a failure of the
    /// primary fetch fails the whole aggregation.
    pub fn aggregate(&self, candidate: &SearchCandidate) -> Result<MetadataRecord, AggregationError> {
        if let Some(record) = &candidate.metadata {
            debug!(id = %candidate.id, "candidate already carries metadata");
            return Ok(record.as_ref().clone());
        }

        let primary_request = self.request(&candidate.id, DetailPart::Primary);
        let supplementary_request = self.request(&candidate.id, DetailPart::Supplementary);
        let enrichment = self.enrichment_request(candidate);

        let (primary, supplementary, enrichment) = thread::scope(|s| {
            let primary = s.spawn(|| self.metadata.fetch_metadata(&primary_request));
            let supplementary = s.spawn(|| self.metadata.fetch_metadata(&supplementary_request));
            let enrichment = enrichment
                .as_ref()
                .map(|(provider, request)| s.spawn(move || provider.fetch_metadata(request)));

            (
                primary.join(),
                supplementary.join(),
                enrichment.map(|handle| handle.join()),
            )
        });

        let primary = match primary {
            Ok(Ok(record)) => record,
            Ok(Err(source)) => {
                return Err(AggregationError::Primary {
                    id: candidate.id.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(AggregationError::Panicked {
                    id: candidate.id.clone(),
                    part: "primary",
                });
            }
        };
        let supplementary = optional_part(&candidate.id, "supplementary", supplementary);
        let enrichment = enrichment.and_then(|joined| optional_part(&candidate.id, "enrichment", joined));

        Ok(merge_records(
            primary,
            supplementary.as_ref(),
            enrichment.as_ref(),
            self.options,
        ))
    }

    fn request(&self, id: &str, part: DetailPart) -> DetailRequest {
        DetailRequest {
            id: id.to_string(),
            part,
            language: self.options.preferred_language.clone(),
            country: self.options.preferred_country.clone(),
        }
    }

    /// The enrichment provider and its request, if enrichment should run
    ///
    /// Enrichment is keyed by IMDb id; the candidate's own id is only usable
    /// when enrichment comes from the same provider that produced it.
    fn enrichment_request(
        &self,
        candidate: &SearchCandidate,
    ) -> Option<(&'a dyn MetadataProvider, DetailRequest)> {
        if !self.options.wants_enrichment() {
            return None;
        }
        let provider = self.enrichment?;

        let id = match &candidate.imdb_id {
            Some(imdb_id) => imdb_id.as_str(),
            None if provider.id() == candidate.provider_id => candidate.id.as_str(),
            None => {
                debug!(id = %candidate.id, provider = provider.id(), "no shared id for enrichment");
                return None;
            }
        };

        Some((provider, self.request(id, DetailPart::Localized)))
    }
}

fn optional_part(id: &str, part: &'static str, joined: Joined) -> Option<MetadataRecord> {
    match joined {
        Ok(Ok(record)) => Some(record),
        Ok(Err(e)) => {
            warn!(id, part, error = %e, "optional fetch failed, continuing without it");
            None
        }
        Err(_) => {
            warn!(id, part, "optional fetch panicked, continuing without it");
            None
        }
    }
}

/// Merges partial records with the aggregation precedence
///
/// Running the merge twice on the same inputs yields the same record.
pub fn merge_records(
    primary: MetadataRecord,
    supplementary: Option<&MetadataRecord>,
    enrichment: Option<&MetadataRecord>,
    options: &ScrapeOptions,
) -> MetadataRecord {
    let mut record = primary;

    if let Some(supplementary) = supplementary {
        fill_missing(&mut record, supplementary);
    }

    if let Some(enriched) = enrichment {
        if options.scrape_foreign_language && !enriched.plot.trim().is_empty() {
            if enriched.tmdb_id.is_some() {
                record.tmdb_id = enriched.tmdb_id;
            }
            record.title.clone_from(&enriched.title);
            record.original_title.clone_from(&enriched.original_title);
            record.tagline.clone_from(&enriched.tagline);
            record.plot.clone_from(&enriched.plot);
            record.collection.clone_from(&enriched.collection);
        }
        if options.scrape_collection_info {
            record.collection.clone_from(&enriched.collection);
        }
    }

    if record.original_title.trim().is_empty() {
        record.original_title = record.title.clone();
    }

    record
}

fn fill_text(target: &mut String, value: &str) {
    if target.trim().is_empty() && !value.trim().is_empty() {
        *target = value.to_string();
    }
}

fn fill_option<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if target.is_none() {
        target.clone_from(value);
    }
}

fn fill_list<T: Clone>(target: &mut Vec<T>, value: &[T]) {
    if target.is_empty() {
        target.extend_from_slice(value);
    }
}

fn fill_missing(record: &mut MetadataRecord, other: &MetadataRecord) {
    fill_option(&mut record.imdb_id, &other.imdb_id);
    fill_option(&mut record.tmdb_id, &other.tmdb_id);
    fill_text(&mut record.title, &other.title);
    fill_text(&mut record.original_title, &other.original_title);
    fill_text(&mut record.tagline, &other.tagline);
    fill_text(&mut record.plot, &other.plot);
    fill_option(&mut record.year, &other.year);
    fill_option(&mut record.release_date, &other.release_date);
    fill_option(&mut record.runtime_minutes, &other.runtime_minutes);
    fill_option(&mut record.rating, &other.rating);
    fill_option(&mut record.vote_count, &other.vote_count);
    fill_option(&mut record.top250, &other.top250);
    fill_list(&mut record.countries, &other.countries);
    fill_list(&mut record.spoken_languages, &other.spoken_languages);
    fill_list(&mut record.certifications, &other.certifications);
    fill_list(&mut record.genres, &other.genres);
    fill_list(&mut record.cast, &other.cast);
    fill_list(&mut record.production_companies, &other.production_companies);
    fill_option(&mut record.collection, &other.collection);
}
