//! Client for the hosted document-search corpus.
//!
//! Articles live in remote collections addressed by a project key plus an
//! index key. A search returns pages of raw hits; each hit carries an
//! ordered list of text segments under `_source."main-text"`. This module
//! owns the wire shapes and the pagination transport; cleaning the hits up
//! is [`crate::collector`]'s job.
//!
//! # Trait seam
//!
//! The collector only sees the [`PageSource`] trait, so tests can swap the
//! HTTP client for an in-memory fake without touching any network code.

use crate::config::CorpusProfile;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Observed page size of the corpus search endpoint.
pub const PAGE_LIMIT: usize = 100;

/// Errors surfaced while talking to the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The search host in the profile is not a valid URL.
    #[error("invalid corpus endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    /// The request never completed (DNS, TLS, timeouts, connection resets).
    #[error("corpus request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("corpus returned HTTP {0}")]
    Status(StatusCode),
    /// The response body did not match the expected page shape.
    #[error("corpus response did not match the expected page shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Coordinates of one remote collection: project plus index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusCoordinates {
    pub project_key: String,
    pub index_key: String,
}

/// A prepared search query against one collection.
///
/// Mirrors the corpus API contract: a free-text search string, a wildcard
/// field selection, a page-size limit, and the collection coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySpec {
    pub search_query: String,
    pub source: Vec<String>,
    pub limit: usize,
    pub coordinates: CorpusCoordinates,
}

impl QuerySpec {
    /// Bundle a search string with collection coordinates using the
    /// standard wildcard selection and page limit.
    pub fn new(search_query: impl Into<String>, coordinates: CorpusCoordinates) -> Self {
        Self {
            search_query: search_query.into(),
            source: vec!["*".to_string()],
            limit: PAGE_LIMIT,
            coordinates,
        }
    }
}

/// One page of raw search results.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub outputs: PageOutputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageOutputs {
    pub data_outputs: Vec<RawHit>,
}

/// One raw search hit as returned by the corpus.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_source")]
    pub source: HitSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitSource {
    #[serde(rename = "main-text", default)]
    pub main_text: Vec<TextSegment>,
}

/// A single text segment of a hit. Some segments carry no text payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TextSegment {
    #[serde(default)]
    pub text: Option<String>,
}

/// Sequential access to the pages of one search.
///
/// `page` is a zero-based page index. Implementors must return pages in
/// corpus order and signal exhaustion with `Ok(None)`; callers request
/// page `n + 1` only after fully consuming page `n`.
pub trait PageSource {
    async fn fetch_page(
        &self,
        spec: &QuerySpec,
        page: usize,
    ) -> Result<Option<SearchPage>, CorpusError>;
}

/// HTTP implementation of [`PageSource`] for the hosted corpus service.
pub struct CorpusClient {
    host: Url,
    username: String,
    api_key: String,
    client: Client,
}

impl std::fmt::Debug for CorpusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusClient")
            .field("host", &self.host.as_str())
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CorpusClient {
    /// Build a client from a resolved profile. Credentials are attached to
    /// every request; callers supply them once, up front.
    pub fn from_profile(profile: &CorpusProfile) -> Result<Self, CorpusError> {
        let host = Url::parse(&profile.host)?;
        Ok(Self {
            host,
            username: profile.username.clone(),
            api_key: profile.api_key.clone(),
            client: Client::new(),
        })
    }

    fn search_url(&self, coordinates: &CorpusCoordinates) -> Result<Url, CorpusError> {
        let path = format!(
            "api/cps/public/v2/project/{}/data_indices/{}/search",
            coordinates.project_key, coordinates.index_key
        );
        Ok(self.host.join(&path)?)
    }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    search_query: &'a str,
    source: &'a [String],
    from: usize,
    size: usize,
}

impl PageSource for CorpusClient {
    #[instrument(level = "debug", skip_all, fields(query = %spec.search_query, page))]
    async fn fetch_page(
        &self,
        spec: &QuerySpec,
        page: usize,
    ) -> Result<Option<SearchPage>, CorpusError> {
        let url = self.search_url(&spec.coordinates)?;
        let body = SearchBody {
            search_query: &spec.search_query,
            source: &spec.source,
            from: page * spec.limit,
            size: spec.limit,
        };

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CorpusError::Status(status));
        }

        let raw = response.text().await?;
        let decoded: SearchPage = serde_json::from_str(&raw)?;
        debug!(hits = decoded.outputs.data_outputs.len(), "Fetched corpus page");

        // Paging past the end of the result set yields an empty window.
        if decoded.outputs.data_outputs.is_empty() {
            return Ok(None);
        }
        Ok(Some(decoded))
    }
}
