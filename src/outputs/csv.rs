//! CSV serialization for all tabular sinks.
//!
//! Tables are rendered into an in-memory buffer and flushed to disk in a
//! single write, after the producing step has fully succeeded.

use crate::models::{ActionTable, ArticleRecord, FakeArticle, RiskRow};
use crate::supply::KnownRisk;
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write output file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize CSV row: {0}")]
    Csv(#[from] csv::Error),
    #[error("record '{0}' has no publication date")]
    MissingDate(String),
}

#[derive(Serialize)]
struct DatedRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Serialize)]
struct RawRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Serialize)]
struct KnownRiskRow<'a> {
    country: &'a str,
    risk: &'a str,
}

#[derive(Serialize)]
struct RiskCsvRow<'a> {
    date: &'a str,
    country: &'a str,
    risk: &'a str,
    title: &'a str,
}

#[derive(Serialize)]
struct FakeRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Content")]
    content: &'a str,
}

fn render<T: Serialize>(rows: impl Iterator<Item = T>, delimiter: u8) -> Result<Vec<u8>, SinkError> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| SinkError::Csv(e.into_error().into()))
}

/// Write a date-filtered article batch as `Title, Date, Text`.
///
/// Every record must carry a timestamp; filtered collection guarantees it.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_dated_articles(records: &[ArticleRecord], path: &Path) -> Result<(), SinkError> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let published_at = record
            .published_at
            .ok_or_else(|| SinkError::MissingDate(record.title.clone()))?;
        rows.push(DatedRow {
            title: &record.title,
            date: published_at.to_rfc3339(),
            text: &record.body,
        });
    }
    let buffer = render(rows.into_iter(), b',')?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote filtered article table");
    Ok(())
}

/// Write a raw article batch as `Title, Text`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_raw_articles(records: &[ArticleRecord], path: &Path) -> Result<(), SinkError> {
    let buffer = render(
        records.iter().map(|record| RawRow {
            title: &record.title,
            text: &record.body,
        }),
        b',',
    )?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote raw article table");
    Ok(())
}

/// Write the matched known risks as `country, risk`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = risks.len()))]
pub async fn write_known_risks(risks: &[KnownRisk], path: &Path) -> Result<(), SinkError> {
    let buffer = render(
        risks.iter().map(|known| KnownRiskRow {
            country: &known.country,
            risk: &known.risk,
        }),
        b',',
    )?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote matched risk table");
    Ok(())
}

/// Write flattened risk rows with `;` as the delimiter.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = rows.len()))]
pub async fn write_risk_rows(rows: &[RiskRow], path: &Path) -> Result<(), SinkError> {
    let buffer = render(
        rows.iter().map(|row| RiskCsvRow {
            date: &row.date,
            country: &row.country,
            risk: &row.risk,
            title: &row.titles,
        }),
        b';',
    )?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote risk table");
    Ok(())
}

/// Write a model-shaped action table verbatim, `;`-delimited.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = table.rows.len()))]
pub async fn write_action_table(table: &ActionTable, path: &Path) -> Result<(), SinkError> {
    let mut writer = WriterBuilder::new().delimiter(b';').from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| SinkError::Csv(e.into_error().into()))?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote action item table");
    Ok(())
}

/// Write synthetic articles as `Title, Content`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn write_fake_articles(articles: &[FakeArticle], path: &Path) -> Result<(), SinkError> {
    let buffer = render(
        articles.iter().map(|article| FakeRow {
            title: &article.title,
            content: &article.content,
        }),
        b',',
    )?;
    tokio::fs::write(path, buffer).await?;
    info!("Wrote synthetic article table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn dated_record(title: &str) -> ArticleRecord {
        ArticleRecord {
            title: title.to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap()),
            body: format!("{title} body"),
        }
    }

    #[tokio::test]
    async fn test_dated_articles_have_three_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        write_dated_articles(&[dated_record("A")], &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("Title,Date,Text"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("A,2022-01-03T00:00:00+00:00,"));
    }

    #[tokio::test]
    async fn test_dated_articles_reject_missing_date() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        let record = ArticleRecord {
            title: "No date".to_string(),
            published_at: None,
            body: "body".to_string(),
        };
        let err = write_dated_articles(&[record], &path).await.unwrap_err();
        assert!(matches!(err, SinkError::MissingDate(_)));
        // Nothing was written.
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_raw_articles_have_two_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let record = ArticleRecord {
            title: "A".to_string(),
            published_at: None,
            body: "A body".to_string(),
        };
        write_raw_articles(&[record], &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Title,Text\n"));
        assert!(written.contains("A,A body"));
    }

    #[tokio::test]
    async fn test_risk_rows_use_semicolon_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("risks.csv");
        let row = RiskRow {
            date: "2022-03-11".to_string(),
            country: "Germany".to_string(),
            risk: "economic sanctions".to_string(),
            titles: "A | B".to_string(),
        };
        write_risk_rows(&[row], &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("date;country;risk;title\n"));
        assert!(written.contains("2022-03-11;Germany;economic sanctions;A | B"));
    }

    #[tokio::test]
    async fn test_known_risks_use_comma_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("matched.csv");
        let matched = KnownRisk {
            country: "Germany".to_string(),
            risk: "economic sanctions".to_string(),
        };
        write_known_risks(&[matched], &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("country,risk\n"));
        assert!(written.contains("Germany,economic sanctions"));
    }

    #[tokio::test]
    async fn test_action_table_round_trips_headers_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actions.csv");
        let table = ActionTable {
            headers: vec!["country".to_string(), "alternative".to_string()],
            rows: vec![vec!["Germany".to_string(), "Route via Rotterdam".to_string()]],
        };
        write_action_table(&table, &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("country;alternative\n"));
        assert!(written.contains("Germany;Route via Rotterdam"));
    }

    #[tokio::test]
    async fn test_fake_articles_have_title_and_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.csv");
        let article = FakeArticle {
            title: "Quarterly output rises.".to_string(),
            content: "Para one.\nPara two.".to_string(),
        };
        write_fake_articles(&[article], &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Title,Content\n"));
        assert!(written.contains("Quarterly output rises."));
    }
}
