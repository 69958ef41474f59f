//! Command-line interface definitions for newsrisk.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets can be provided via command-line flags or environment variables;
//! everything else lives in the YAML config file.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Command-line arguments for the newsrisk application.
///
/// # Examples
///
/// ```sh
/// # Collect articles for every configured corpus index
/// newsrisk fetch -q Ukraine --since 2022-01-01
///
/// # Assess one day of collected articles
/// newsrisk assess -d 2022-03-11
///
/// # Intersect known risks with a supply chain and ask for mitigations
/// newsrisk chain --supply-chain supplychain.csv --risks risks.csv
///
/// # Produce a synthetic article table for offline testing
/// newsrisk generate -n 50 --seed 7
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "newsrisk.yaml")]
    pub config: String,

    /// Corpus API key (overrides the config file)
    #[arg(long, env = "DEEPSEARCH_API_KEY", hide_env_values = true)]
    pub corpus_api_key: Option<String>,

    /// Chat endpoint API key (overrides the config file)
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run all configured collection jobs in parallel
    Fetch {
        /// Search query sent to every corpus index
        #[arg(short, long)]
        query: String,

        /// Override the date bound of every filtered job
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Directory the article tables are written to
        #[arg(short, long, default_value = ".")]
        output_dir: String,
    },

    /// Assess per-country risks for one day of collected articles
    Assess {
        /// Collected article table (fetch output)
        #[arg(short, long, default_value = "news_headers_df.csv")]
        input: String,

        /// The publication date to assess
        #[arg(short, long)]
        date: NaiveDate,

        /// Maximum number of articles sent to the model
        #[arg(long, default_value_t = 10)]
        max_articles: usize,

        /// Directory the risk table is written to
        #[arg(short, long, default_value = ".")]
        output_dir: String,
    },

    /// Match known risks against a supply chain and fetch mitigations
    Chain {
        /// Supply chain table with a `location` column
        #[arg(long, default_value = "supplychain.csv")]
        supply_chain: String,

        /// Known risks table with `country` and `risk` columns
        #[arg(long, default_value = "risks.csv")]
        risks: String,

        /// Directory the result tables are written to
        #[arg(short, long, default_value = ".")]
        output_dir: String,
    },

    /// Generate a synthetic news table for offline testing
    Generate {
        /// How many articles to generate
        #[arg(short = 'n', long, default_value_t = 50)]
        count: usize,

        /// Output file
        #[arg(short, long, default_value = "fake_news.csv")]
        output: String,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}
