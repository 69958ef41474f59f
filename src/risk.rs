//! Daily risk assessment over a collected article table.
//!
//! Reads a `Title, Date, Text` table (the fetch output), selects the
//! articles published on a target date, sends their text to the chat
//! endpoint in one risk prompt, and flattens the per-country JSON reply
//! into [`RiskRow`]s.
//!
//! The endpoint is observed to wrap its JSON in code fences and to emit
//! single-quoted pseudo-JSON; both are tolerated. A reply that still does
//! not parse fails the command with a typed error instead of panicking,
//! and a reply that parses but was cut off mid-stream is re-asked once.

use crate::llm::{ChatBackend, LlmError};
use crate::models::RiskRow;
use crate::utils::{looks_truncated, strip_code_fence, truncate_for_log};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("failed to read article table: {0}")]
    Io(#[from] std::io::Error),
    #[error("article table is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("risk reply was not a country-to-risks map: {0}")]
    ReplyShape(String),
    #[error("no articles dated {0} in the input table")]
    NoArticles(NaiveDate),
}

/// One article read back from a collected table.
#[derive(Debug, Clone)]
pub struct InputArticle {
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ArticleRow {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Text")]
    text: String,
}

/// The reply map's values: either a list of risk factors or a bare one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RiskList {
    Many(Vec<String>),
    One(String),
}

/// Read a collected article table from disk.
///
/// Rows whose timestamp does not parse are skipped with a warning; the
/// table may mix RFC 3339 timestamps with naive `YYYY-MM-DD HH:MM:SS` ones
/// from older runs.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_article_table(path: &Path) -> Result<Vec<InputArticle>, RiskError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut articles = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<ArticleRow>() {
        let row = row?;
        match parse_timestamp(&row.date) {
            Some(published_at) => articles.push(InputArticle {
                title: row.title,
                published_at,
                text: row.text,
            }),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "Dropped rows with unparseable timestamps");
    }
    info!(count = articles.len(), "Read article table");
    Ok(articles)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Select the day's working set: oldest-first, de-duplicated by title,
/// limited to the articles published on `date`, capped at `max_articles`.
pub fn select_articles(
    mut articles: Vec<InputArticle>,
    date: NaiveDate,
    max_articles: usize,
) -> Vec<InputArticle> {
    articles.sort_by_key(|article| article.published_at);
    articles
        .into_iter()
        .unique_by(|article| article.title.clone())
        .filter(|article| article.published_at.date_naive() == date)
        .take(max_articles)
        .collect()
}

/// Build the single risk prompt for a set of article texts.
pub fn risk_prompt(texts: &[String]) -> String {
    let doc = serde_json::to_string(texts).unwrap_or_default();
    format!(
        "Based on the following articles, assess risks in terms of [trade tensions, \
         political instability, economic sanctions, natural disasters, conflicts, and \
         regulatory changes] for all countries mentioned in the articles. Only respond \
         with a list of countries and their risk {doc}. Respond in JSON format."
    )
}

/// Parse the model's reply into a country-to-risks map.
///
/// Tries the fenced content verbatim first, then once more with single
/// quotes swapped for double quotes.
pub fn parse_risk_reply(reply: &str) -> Result<BTreeMap<String, Vec<String>>, serde_json::Error> {
    let cleaned = strip_code_fence(reply);
    let direct = serde_json::from_str::<BTreeMap<String, RiskList>>(cleaned);
    let parsed = match direct {
        Ok(map) => map,
        Err(first_err) => {
            let requoted = cleaned.replace('\'', "\"");
            match serde_json::from_str::<BTreeMap<String, RiskList>>(&requoted) {
                Ok(map) => map,
                Err(_) => return Err(first_err),
            }
        }
    };
    Ok(parsed
        .into_iter()
        .map(|(country, risks)| {
            let risks = match risks {
                RiskList::Many(risks) => risks,
                RiskList::One(risk) => vec![risk],
            };
            (country, risks)
        })
        .collect())
}

/// Flatten a country-to-risks map into one row per risk factor.
pub fn flatten_risks(
    map: BTreeMap<String, Vec<String>>,
    date: NaiveDate,
    titles: &str,
) -> Vec<RiskRow> {
    let date = date.to_string();
    map.into_iter()
        .flat_map(|(country, risks)| {
            let date = date.clone();
            risks.into_iter().map(move |risk| RiskRow {
                date: date.clone(),
                country: country.clone(),
                risk,
                titles: titles.to_string(),
            })
        })
        .collect()
}

/// Run a full assessment for one date over a collected article table.
#[instrument(level = "info", skip_all, fields(input = %input.display(), %date))]
pub async fn assess<B>(
    backend: &B,
    input: &Path,
    date: NaiveDate,
    max_articles: usize,
) -> Result<Vec<RiskRow>, RiskError>
where
    B: ChatBackend<Response = String>,
{
    let articles = read_article_table(input)?;
    let selected = select_articles(articles, date, max_articles);
    if selected.is_empty() {
        return Err(RiskError::NoArticles(date));
    }
    info!(count = selected.len(), "Selected articles for assessment");

    let titles = selected.iter().map(|article| article.title.as_str()).join(" | ");
    let texts: Vec<String> = selected.into_iter().map(|article| article.text).collect();
    let prompt = risk_prompt(&texts);

    let reply = backend.complete(&prompt).await?;
    let mut parsed = parse_risk_reply(&reply);

    // A cut-off reply shows up as an EOF parse error; re-ask once.
    if let Err(ref e) = parsed {
        if looks_truncated(e) {
            warn!(error = %e, "EOF while parsing risk reply; re-asking once");
            let retry_reply = backend.complete(&prompt).await?;
            parsed = parse_risk_reply(&retry_reply);
        }
    }

    let map = match parsed {
        Ok(map) => map,
        Err(e) => {
            warn!(
                error = %e,
                reply_preview = %truncate_for_log(&reply, 300),
                "Risk reply did not conform to the expected shape"
            );
            return Err(RiskError::ReplyShape(e.to_string()));
        }
    };

    let rows = flatten_risks(map, date, &titles);
    info!(rows = rows.len(), "Flattened risk assessment");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn article(title: &str, day: u32, hour: u32) -> InputArticle {
        InputArticle {
            title: title.to_string(),
            published_at: Utc.with_ymd_and_hms(2022, 3, day, hour, 0, 0).unwrap(),
            text: format!("{title} text"),
        }
    }

    #[test]
    fn test_select_articles_filters_by_date_and_caps() {
        let articles = vec![
            article("A", 11, 9),
            article("B", 10, 9),
            article("C", 11, 12),
            article("D", 11, 15),
        ];
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let selected = select_articles(articles, date, 2);
        let titles: Vec<&str> = selected.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[test]
    fn test_select_articles_deduplicates_keeping_oldest() {
        let articles = vec![article("A", 11, 15), article("A", 11, 9), article("B", 11, 12)];
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let selected = select_articles(articles, date, 10);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].title, "A");
        assert_eq!(
            selected[0].published_at,
            Utc.with_ymd_and_hms(2022, 3, 11, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_risk_reply_accepts_clean_json() {
        let reply = r#"{"Germany": ["economic sanctions"], "Taiwan": ["trade tensions", "conflicts"]}"#;
        let map = parse_risk_reply(reply).unwrap();
        assert_eq!(map["Germany"], vec!["economic sanctions"]);
        assert_eq!(map["Taiwan"].len(), 2);
    }

    #[test]
    fn test_parse_risk_reply_accepts_fenced_json() {
        let reply = "```json\n{\"Germany\": [\"conflicts\"]}\n```";
        let map = parse_risk_reply(reply).unwrap();
        assert_eq!(map["Germany"], vec!["conflicts"]);
    }

    #[test]
    fn test_parse_risk_reply_accepts_single_quotes() {
        let reply = "{'Germany': ['political instability']}";
        let map = parse_risk_reply(reply).unwrap();
        assert_eq!(map["Germany"], vec!["political instability"]);
    }

    #[test]
    fn test_parse_risk_reply_accepts_bare_string_values() {
        let reply = r#"{"Germany": "regulatory changes"}"#;
        let map = parse_risk_reply(reply).unwrap();
        assert_eq!(map["Germany"], vec!["regulatory changes"]);
    }

    #[test]
    fn test_parse_risk_reply_rejects_non_map() {
        assert!(parse_risk_reply("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_flatten_risks_one_row_per_factor() {
        let mut map = BTreeMap::new();
        map.insert(
            "Germany".to_string(),
            vec!["conflicts".to_string(), "economic sanctions".to_string()],
        );
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let rows = flatten_risks(map, date, "A | B");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2022-03-11");
        assert_eq!(rows[0].country, "Germany");
        assert_eq!(rows[0].titles, "A | B");
    }

    #[derive(Debug)]
    struct ScriptedBackend {
        replies: Mutex<Vec<String>>,
    }

    impl ChatBackend for ScriptedBackend {
        type Response = String;

        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            let mut replies = self.replies.lock().unwrap();
            Ok(replies.remove(0))
        }
    }

    fn write_input_table(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("news_headers_df.csv");
        let mut writer = csv::Writer::from_path(&path).unwrap();
        writer.write_record(["Title", "Date", "Text"]).unwrap();
        writer
            .write_record(["A", "2022-03-11T09:00:00+00:00", "textA"])
            .unwrap();
        writer
            .write_record(["B", "2022-03-10 09:00:00", "textB"])
            .unwrap();
        writer.flush().unwrap();
        path
    }

    #[tokio::test]
    async fn test_assess_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input_table(dir.path());
        let backend = ScriptedBackend {
            replies: Mutex::new(vec![r#"{"Ukraine": ["conflicts"]}"#.to_string()]),
        };
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let rows = assess(&backend, &input, date, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].country, "Ukraine");
        assert_eq!(rows[0].titles, "A");
    }

    #[tokio::test]
    async fn test_assess_reasks_once_on_truncated_reply() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input_table(dir.path());
        let backend = ScriptedBackend {
            replies: Mutex::new(vec![
                r#"{"Ukraine": ["conflic"#.to_string(),
                r#"{"Ukraine": ["conflicts"]}"#.to_string(),
            ]),
        };
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let rows = assess(&backend, &input, date, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].risk, "conflicts");
    }

    #[tokio::test]
    async fn test_assess_fails_when_no_articles_match_date() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input_table(dir.path());
        let backend = ScriptedBackend {
            replies: Mutex::new(vec![]),
        };
        let date = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let err = assess(&backend, &input, date, 10).await.unwrap_err();
        assert!(matches!(err, RiskError::NoArticles(_)));
    }

    #[tokio::test]
    async fn test_assess_surfaces_malformed_reply() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input_table(dir.path());
        let backend = ScriptedBackend {
            replies: Mutex::new(vec!["I cannot help with that.".to_string()]),
        };
        let date = NaiveDate::from_ymd_opt(2022, 3, 11).unwrap();
        let err = assess(&backend, &input, date, 10).await.unwrap_err();
        assert!(matches!(err, RiskError::ReplyShape(_)));
    }
}
