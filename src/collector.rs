//! Turns paginated corpus search hits into clean article tables.
//!
//! The collector consumes pages from an injected [`PageSource`] in arrival
//! order, extracts one [`ArticleRecord`] per usable hit, and post-processes
//! the batch according to the [`CollectMode`]:
//!
//! - **Filtered**: hits whose date segment does not parse, or is not
//!   strictly newer than the bound, are dropped per hit; survivors are
//!   de-duplicated by title (first occurrence wins) and sorted newest-first.
//! - **Raw**: every hit with at least one text segment becomes a record,
//!   with no date handling at all.
//!
//! Per-hit date problems never abort a batch. Transport failures do: they
//! surface as [`CollectError::Retrieval`] so the caller can tell a bad hit
//! from a dead service.

use crate::corpus::{CorpusCoordinates, CorpusError, PageSource, QuerySpec, RawHit};
use crate::models::{ArticleRecord, CollectMode};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// A collection job failed before producing a complete batch.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The corpus errored while paging; the partial batch is discarded.
    #[error("article retrieval failed: {0}")]
    Retrieval(#[source] CorpusError),
}

/// Why a single hit was left out of the batch. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSkip {
    /// The hit carried no text segments at all.
    Empty,
    /// The expected date segment was missing or did not parse.
    DateUnparseable,
    /// The date parsed but was not strictly newer than the bound.
    OutOfBound,
}

/// Collects articles from one remote collection.
pub struct ArticleCollector<S> {
    source: S,
    coordinates: CorpusCoordinates,
}

impl<S: PageSource> ArticleCollector<S> {
    /// The page source is injected here, never resolved from ambient state;
    /// credentials must already be attached to it.
    pub fn new(source: S, coordinates: CorpusCoordinates) -> Self {
        Self {
            source,
            coordinates,
        }
    }

    fn prepare_query(&self, query: &str) -> QuerySpec {
        QuerySpec::new(query, self.coordinates.clone())
    }

    /// Run one collection: page through the corpus, extract records, and
    /// apply the mode's filtering and ordering.
    ///
    /// The whole result set is materialized before returning; nothing is
    /// written or emitted while pages are still in flight. An exhausted
    /// query with zero hits is a successful empty batch.
    #[instrument(level = "info", skip_all, fields(query = %query, index = %self.coordinates.index_key))]
    pub async fn collect(
        &self,
        query: &str,
        mode: &CollectMode,
    ) -> Result<Vec<ArticleRecord>, CollectError> {
        let spec = self.prepare_query(query);
        let mut records: Vec<ArticleRecord> = Vec::new();
        let mut skipped_empty = 0usize;
        let mut skipped_unparseable = 0usize;
        let mut skipped_out_of_bound = 0usize;

        let mut page_index = 0usize;
        loop {
            let page = self
                .source
                .fetch_page(&spec, page_index)
                .await
                .map_err(CollectError::Retrieval)?;
            let Some(page) = page else { break };

            let hits = page.outputs.data_outputs;
            debug!(page = page_index, hits = hits.len(), "Processing corpus page");
            for hit in &hits {
                match extract_record(hit, mode) {
                    Ok(record) => records.push(record),
                    Err(HitSkip::Empty) => skipped_empty += 1,
                    Err(HitSkip::DateUnparseable) => skipped_unparseable += 1,
                    Err(HitSkip::OutOfBound) => skipped_out_of_bound += 1,
                }
            }
            page_index += 1;
        }

        if matches!(mode, CollectMode::Filtered { .. }) {
            // First occurrence wins, in page-arrival order.
            records = records
                .into_iter()
                .unique_by(|r| r.title.clone())
                .collect::<Vec<ArticleRecord>>();
            // Stable sort keeps de-duplication order for equal timestamps.
            records.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        }

        info!(
            count = records.len(),
            skipped_empty,
            skipped_unparseable,
            skipped_out_of_bound,
            "Collected articles"
        );
        Ok(records)
    }
}

/// Extract a single record from a raw hit, or name the reason it was skipped.
///
/// The date, when required, is read from the second text segment in the
/// `"Weekday, DD Mon YYYY HH:MM:SS TZ"` (RFC 2822) shape the corpus emits
/// for news articles. The position is an observed convention of the feed,
/// not a guarantee, so a failed parse is an expected outcome.
pub fn extract_record(hit: &RawHit, mode: &CollectMode) -> Result<ArticleRecord, HitSkip> {
    let segments = &hit.source.main_text;
    let Some(first) = segments.first() else {
        return Err(HitSkip::Empty);
    };

    let title = first.text.clone().unwrap_or_default();
    let body: String = segments
        .iter()
        .filter_map(|segment| segment.text.as_deref())
        .collect();

    match mode {
        CollectMode::Raw => Ok(ArticleRecord {
            title,
            published_at: None,
            body,
        }),
        CollectMode::Filtered { date_bound } => {
            let raw_date = segments
                .get(1)
                .and_then(|segment| segment.text.as_deref())
                .ok_or(HitSkip::DateUnparseable)?;
            let published_at = parse_article_date(raw_date).ok_or(HitSkip::DateUnparseable)?;
            if published_at > *date_bound {
                Ok(ArticleRecord {
                    title,
                    published_at: Some(published_at),
                    body,
                })
            } else {
                Err(HitSkip::OutOfBound)
            }
        }
    }
}

fn parse_article_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
