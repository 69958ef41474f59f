//! Data models for collected articles and derived risk tables.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleRecord`]: A cleaned article extracted from a corpus search hit
//! - [`CollectMode`]: The two collection behaviors (date-filtered vs. raw)
//! - [`RiskRow`]: One flattened country/risk pair from a model assessment
//! - [`FakeArticle`]: A synthetic article produced by the generator

use chrono::{DateTime, Utc};

/// A cleaned news article extracted from one corpus search hit.
///
/// The `title` is the first text segment of the hit and doubles as the
/// de-duplication key. The `body` is the concatenation of every text
/// segment of the hit in source order, with no separator inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    /// The article headline; de-duplication key within one collected batch.
    pub title: String,
    /// Publication timestamp parsed from the hit, when available.
    ///
    /// Always `Some` for records produced in [`CollectMode::Filtered`];
    /// always `None` for records produced in [`CollectMode::Raw`].
    pub published_at: Option<DateTime<Utc>>,
    /// All text segments of the hit joined in source order.
    pub body: String,
}

/// Collection behavior for a single corpus query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectMode {
    /// Parse each hit's date, keep only hits strictly newer than the bound,
    /// then de-duplicate by title and sort newest-first.
    Filtered {
        /// Exclusive lower bound on `published_at`.
        date_bound: DateTime<Utc>,
    },
    /// No date parsing or filtering; every hit with at least one text
    /// segment becomes a record.
    Raw,
}

/// One row of a risk assessment table.
///
/// The model replies with a map from country to a list of risk factors;
/// each factor becomes its own row so the table stays flat.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskRow {
    /// The assessment date in `YYYY-MM-DD` format.
    pub date: String,
    /// Country (or region) the risk applies to.
    pub country: String,
    /// A single risk factor named by the model.
    pub risk: String,
    /// Headlines of the articles the assessment was based on.
    pub titles: String,
}

/// A synthetic article emitted by the generator.
#[derive(Debug, Clone)]
pub struct FakeArticle {
    pub title: String,
    pub content: String,
}

/// A free-form delimited table, used for model replies whose columns are
/// chosen by the model (the mitigation/action-item CSV).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
