//! Configuration loading for corpus credentials, collection jobs, and the
//! chat endpoint.
//!
//! All coordinates and credentials come from a YAML file plus environment
//! overrides; nothing is hardcoded in the binary. A minimal config:
//!
//! ```yaml
//! corpus:
//!   host: https://sds.app.accelerate.science/
//!   username: analyst@example.com
//!   project_key: 628052f6ea6d4f03c8e4f6adc50a8bf98dcc53e6
//! jobs:
//!   - name: bbc
//!     index_key: 68cd3a7d7790df65d5cd02bce5c2c6f350d07a9a
//!     mode: filtered
//!     since: 2022-01-01
//!     output: news_headers_df.csv
//!   - name: eu-press
//!     index_key: c0ea43d24c5deb9c15db6308cbfb175b7b32aeb4
//!     mode: raw
//!     output: news_headers.csv
//! llm:
//!   base_url: https://llms.example.net
//!   model: gpt-3.5
//! ```
//!
//! API keys belong in `DEEPSEARCH_API_KEY` / `LLM_API_KEY` (or the matching
//! CLI flags), not in the file, though the file fields exist for local use.

use crate::models::CollectMode;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing {0} (set it in the config file, the environment, or via the CLI flag)")]
    MissingSecret(&'static str),
    #[error("job '{job}' is date-filtered but has no date bound (set `since` or pass --since)")]
    MissingDateBound { job: String },
}

/// Everything the binary needs to run any of its commands.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub corpus: CorpusProfile,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
    pub llm: LlmProfile,
}

/// Resolved corpus service account plus the project all jobs live under.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusProfile {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub api_key: String,
    pub project_key: String,
}

/// One collection job: which index to search, how, and where the table goes.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub index_key: String,
    pub mode: JobMode,
    /// Lower date bound for `filtered` jobs; ignored for `raw` jobs.
    #[serde(default)]
    pub since: Option<NaiveDate>,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Filtered,
    Raw,
}

/// Chat endpoint settings for the risk commands.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmProfile {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

impl JobSpec {
    /// Resolve this job's [`CollectMode`]. A CLI-supplied date takes
    /// precedence over the config file; filtered jobs must end up with one.
    pub fn collect_mode(&self, since_override: Option<NaiveDate>) -> Result<CollectMode, ConfigError> {
        match self.mode {
            JobMode::Raw => Ok(CollectMode::Raw),
            JobMode::Filtered => {
                let since = since_override.or(self.since).ok_or_else(|| {
                    ConfigError::MissingDateBound {
                        job: self.name.clone(),
                    }
                })?;
                Ok(CollectMode::Filtered {
                    date_bound: since.and_time(NaiveTime::MIN).and_utc(),
                })
            }
        }
    }
}

impl Config {
    /// Overlay secrets picked up from the environment or CLI flags onto the
    /// values (if any) from the file.
    pub fn apply_secrets(&mut self, corpus_api_key: Option<String>, llm_api_key: Option<String>) {
        if let Some(key) = corpus_api_key {
            self.corpus.api_key = key;
        }
        if let Some(key) = llm_api_key {
            self.llm.api_key = key;
        }
    }

    pub fn require_corpus_key(&self) -> Result<(), ConfigError> {
        if self.corpus.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("corpus API key"));
        }
        Ok(())
    }

    pub fn require_llm_key(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("chat endpoint API key"));
        }
        Ok(())
    }
}

/// Load and parse the YAML config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&raw)?;
    info!(path = %path.display(), jobs = config.jobs.len(), "Loaded configuration");
    Ok(config)
}
