//! # newsrisk
//!
//! A pipeline that collects news articles from a hosted document-search
//! corpus and turns them into supply-chain risk intelligence via a hosted
//! language-model endpoint.
//!
//! ## Commands
//!
//! - `fetch`: run every configured collection job in parallel, writing one
//!   clean article table per corpus index
//! - `assess`: send one day of collected articles to the model and flatten
//!   the per-country risk reply into a delimited table
//! - `chain`: intersect known risks with a supply chain's countries and
//!   regions, then ask the model for mitigation options
//! - `generate`: emit a synthetic article table for offline testing
//!
//! ## Usage
//!
//! ```sh
//! newsrisk -c newsrisk.yaml fetch -q Ukraine --since 2022-01-01
//! newsrisk assess -d 2022-03-11
//! ```
//!
//! ## Architecture
//!
//! Collection jobs are independent fork/join tasks: each job owns its
//! corpus index and output file, pages sequentially within itself, and
//! never shares state with its siblings. One job failing does not cancel
//! the others; failures are aggregated after the join.

use chrono::NaiveDate;
use clap::Parser;
use futures::future::join_all;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collector;
mod config;
mod corpus;
mod llm;
mod models;
mod outputs;
mod risk;
mod supply;
mod synth;
mod utils;

use cli::{Cli, Command};
use collector::{ArticleCollector, CollectError};
use config::{Config, CorpusProfile, JobSpec, load_config};
use corpus::{CorpusClient, CorpusCoordinates, CorpusError};
use models::CollectMode;
use outputs::csv::SinkError;
use utils::ensure_writable_dir;

/// Everything that can sink a single collection job.
#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsrisk starting up");

    let args = Cli::parse();
    debug!(config = %args.config, "Parsed CLI arguments");

    match args.command {
        Command::Fetch {
            query,
            since,
            output_dir,
        } => {
            let config = load_and_resolve(&args.config, args.corpus_api_key, args.llm_api_key)?;
            run_fetch(config, query, since, output_dir).await?;
        }
        Command::Assess {
            input,
            date,
            max_articles,
            output_dir,
        } => {
            let config = load_and_resolve(&args.config, args.corpus_api_key, args.llm_api_key)?;
            run_assess(config, input, date, max_articles, output_dir).await?;
        }
        Command::Chain {
            supply_chain,
            risks,
            output_dir,
        } => {
            let config = load_and_resolve(&args.config, args.corpus_api_key, args.llm_api_key)?;
            run_chain(config, supply_chain, risks, output_dir).await?;
        }
        Command::Generate {
            count,
            output,
            seed,
        } => {
            run_generate(count, output, seed).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

fn load_and_resolve(
    path: &str,
    corpus_api_key: Option<String>,
    llm_api_key: Option<String>,
) -> Result<Config, config::ConfigError> {
    let mut config = load_config(Path::new(path))?;
    config.apply_secrets(corpus_api_key, llm_api_key);
    Ok(config)
}

/// Run every configured collection job in parallel and join them all.
#[instrument(level = "info", skip_all, fields(%query))]
async fn run_fetch(
    config: Config,
    query: String,
    since: Option<NaiveDate>,
    output_dir: String,
) -> Result<(), Box<dyn Error>> {
    config.require_corpus_key()?;
    ensure_writable_dir(&output_dir).await?;

    if config.jobs.is_empty() {
        info!("No collection jobs configured; nothing to do");
        return Ok(());
    }

    // Resolve every job's mode up front so a bad config fails before any
    // network traffic starts.
    let mut prepared = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        let mode = job.collect_mode(since)?;
        let output_path = Path::new(&output_dir).join(&job.output);
        prepared.push((job.clone(), mode, output_path));
    }

    let handles: Vec<_> = prepared
        .into_iter()
        .map(|(job, mode, output_path)| {
            let profile = config.corpus.clone();
            let query = query.clone();
            let name = job.name.clone();
            let handle = tokio::spawn(async move {
                run_collection_job(profile, job, query, mode, output_path).await
            });
            (name, handle)
        })
        .collect();

    let names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
    let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

    let mut failed = 0usize;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(Ok(count)) => info!(job = %name, count, "Collection job finished"),
            Ok(Err(e)) => {
                failed += 1;
                error!(job = %name, error = %e, "Collection job failed");
            }
            Err(e) => {
                failed += 1;
                error!(job = %name, error = %e, "Collection job panicked");
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} collection job(s) failed").into());
    }
    Ok(())
}

/// One fork/join worker: collect from a single corpus index and write the
/// sink only once the whole batch is in hand.
async fn run_collection_job(
    profile: CorpusProfile,
    job: JobSpec,
    query: String,
    mode: CollectMode,
    output_path: PathBuf,
) -> Result<usize, JobError> {
    let client = CorpusClient::from_profile(&profile)?;
    let coordinates = CorpusCoordinates {
        project_key: profile.project_key.clone(),
        index_key: job.index_key.clone(),
    };
    let collector = ArticleCollector::new(client, coordinates);
    let records = collector.collect(&query, &mode).await?;

    match mode {
        CollectMode::Filtered { .. } => {
            outputs::csv::write_dated_articles(&records, &output_path).await?
        }
        CollectMode::Raw => outputs::csv::write_raw_articles(&records, &output_path).await?,
    }
    Ok(records.len())
}

#[instrument(level = "info", skip_all, fields(%date))]
async fn run_assess(
    config: Config,
    input: String,
    date: NaiveDate,
    max_articles: usize,
    output_dir: String,
) -> Result<(), Box<dyn Error>> {
    config.require_llm_key()?;
    ensure_writable_dir(&output_dir).await?;

    let backend = llm::retrying_client(&config.llm);
    let rows = risk::assess(&backend, Path::new(&input), date, max_articles).await?;

    let output_path = Path::new(&output_dir).join(format!("{date}-output.csv"));
    outputs::csv::write_risk_rows(&rows, &output_path).await?;
    info!(rows = rows.len(), path = %output_path.display(), "Risk assessment written");
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_chain(
    config: Config,
    supply_chain: String,
    risks: String,
    output_dir: String,
) -> Result<(), Box<dyn Error>> {
    config.require_llm_key()?;
    ensure_writable_dir(&output_dir).await?;

    let sites = supply::read_supply_chain(Path::new(&supply_chain))?;
    let known_risks = supply::read_known_risks(Path::new(&risks))?;
    let matched = supply::intersect_risks(&sites, &known_risks);

    let matched_path = Path::new(&output_dir).join("supply_chain_risks_per_country.csv");
    outputs::csv::write_known_risks(&matched, &matched_path).await?;

    if matched.is_empty() {
        info!("No known risks touch this supply chain; skipping mitigation prompt");
        return Ok(());
    }

    let backend = llm::retrying_client(&config.llm);
    let table = supply::action_items(&backend, &matched).await?;

    let actions_path = Path::new(&output_dir).join("action_items.csv");
    outputs::csv::write_action_table(&table, &actions_path).await?;
    info!(rows = table.rows.len(), path = %actions_path.display(), "Action items written");
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_generate(
    count: usize,
    output: String,
    seed: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let articles = synth::generate(count, seed);
    outputs::csv::write_fake_articles(&articles, Path::new(&output)).await?;
    info!(count = articles.len(), path = %output, "Synthetic article table written");
    Ok(())
}
