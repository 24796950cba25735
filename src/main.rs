//! CLI entry point for corpus-search.
//!
//! Loads author records from the data directory, builds the indexes and
//! answers article and author queries from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use corpus_search::display::{
    create_article_table, create_author_table, create_failure_table, create_stats_table,
};
use corpus_search::vector::EmbeddingError;
use corpus_search::{
    AuthorHit, EmbeddingProvider, EntityKind, FastEmbedProvider, IngestReport, Query, RecordStore,
    SearchResults, Settings, Store, StoreError, VectorDimension,
};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Embedding-backed author and article search
#[derive(Parser)]
#[command(
    name = "corpus-search",
    version = env!("CARGO_PKG_VERSION"),
    about = "Embedding-backed author and article search",
    long_about = "Search research articles and their authors by meaning. Records live in one JSON file per author.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .corpus-search directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display active settings")]
    Config,

    #[command(about = "Load records and report counts and ingestion failures")]
    Stats {
        /// Directory with author JSON files (overrides data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// List every rejected record
        #[arg(long)]
        failures: bool,
    },

    #[command(about = "Search articles or authors")]
    Search {
        /// Text to embed with the configured model
        #[arg(required_unless_present = "vector_file")]
        query: Option<String>,

        /// What to rank: article or author
        #[arg(long, default_value = "article")]
        kind: EntityKind,

        /// Rank authors by weighted summed article similarity
        #[arg(long)]
        weighted: bool,

        /// Number of results
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// JSON file holding the query vector, instead of text
        #[arg(long, conflicts_with = "query")]
        vector_file: Option<PathBuf>,

        /// Directory with author JSON files (overrides data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Provider for runs that never embed text.
struct VectorOnly {
    dimension: VectorDimension,
}

impl EmbeddingProvider for VectorOnly {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Generation(
            "no embedding model loaded for this command".to_string(),
        ))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

#[derive(Debug, Serialize)]
struct JsonHit<'a> {
    rank: usize,
    id: &'a str,
    score: f32,
    label: String,
}

fn setup_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => Settings::load().context("Configuration error")?,
    };
    Ok(settings)
}

/// Creates a store and fills it from the data directory.
fn open_store(
    settings: &Settings,
    data_dir: Option<&Path>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<(Store, IngestReport)> {
    let store = Store::from_settings(settings, embedder)?;
    let dir = data_dir.unwrap_or(settings.data_dir.as_path());
    let records = RecordStore::new(dir);

    let start = Instant::now();
    let report = store.ingest_from(&records, settings.ingest.policy())?;
    tracing::info!(
        "Loaded {} authors from {} in {:?}",
        report.authors,
        dir.display(),
        start.elapsed()
    );
    Ok((store, report))
}

fn read_query_vector(path: &Path) -> anyhow::Result<Vec<f32>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read query vector from {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} does not hold a JSON array of numbers", path.display()))
}

fn author_json(hits: &[AuthorHit]) -> Vec<JsonHit<'_>> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| JsonHit {
            rank: i + 1,
            id: hit.author.id().as_str(),
            score: hit.score,
            label: hit.author.display_name(),
        })
        .collect()
}

fn print_results(results: &SearchResults, json: bool) -> anyhow::Result<()> {
    match (results, json) {
        (SearchResults::Articles(hits), false) => println!("{}", create_article_table(hits)),
        (SearchResults::Authors(hits), false) => println!("{}", create_author_table(hits)),
        (SearchResults::Articles(hits), true) => {
            let rows: Vec<JsonHit> = hits
                .iter()
                .enumerate()
                .map(|(i, hit)| JsonHit {
                    rank: i + 1,
                    id: hit.article.id().as_str(),
                    score: hit.score,
                    label: hit.article.title().to_string(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        (SearchResults::Authors(hits), true) => {
            println!("{}", serde_json::to_string_pretty(&author_json(hits))?);
        }
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        let root = std::env::current_dir().context("Cannot determine current directory")?;
        let path = Settings::init_config_file(&root, force)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        println!("Created configuration file at: {}", path.display());
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    let settings = load_settings(cli.config.as_deref())?;
    setup_logging(cli.debug || settings.debug);

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", settings.to_toml()?);
            Ok(())
        }

        Commands::Stats { data_dir, failures } => {
            let embedder = Arc::new(VectorOnly {
                dimension: settings.index.vector_dimension()?,
            });
            let (store, report) = open_store(&settings, data_dir.as_deref(), embedder)?;
            let build = store.build()?;

            println!("{}", create_stats_table(&store.stats(), &report));
            if !build.skipped_authors.is_empty() {
                println!(
                    "{} authors have no articles and are not in the author index",
                    build.skipped_authors.len()
                );
            }
            if failures && !report.failures.is_empty() {
                println!("{}", create_failure_table(&report.failures));
            }
            Ok(())
        }

        Commands::Search {
            query,
            kind,
            weighted,
            top_k,
            vector_file,
            data_dir,
            json,
        } => {
            let query = match (query, vector_file) {
                (_, Some(path)) => Query::Vector(read_query_vector(&path)?),
                (Some(text), None) => Query::Text(text),
                (None, None) => anyhow::bail!("Provide a query or --vector-file"),
            };
            let embedder: Arc<dyn EmbeddingProvider> = match &query {
                Query::Text(_) => Arc::new(FastEmbedProvider::new(
                    &settings.embedding.model,
                    settings.embedding.show_download_progress,
                )?),
                Query::Vector(_) => Arc::new(VectorOnly {
                    dimension: settings.index.vector_dimension()?,
                }),
            };

            let (store, report) = open_store(&settings, data_dir.as_deref(), embedder)?;
            if !report.is_clean() {
                eprintln!(
                    "Warning: {} records were rejected; run `corpus-search stats --failures` for details",
                    report.failures.len()
                );
            }

            let results = if weighted {
                if kind != EntityKind::Author {
                    anyhow::bail!("--weighted ranks authors; use it with --kind author");
                }
                SearchResults::Authors(store.weighted_search_author(query, top_k)?)
            } else {
                store.build()?;
                store.search(query, kind, top_k)?
            };

            print_results(&results, json)
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        if let Some(store_error) = e.downcast_ref::<StoreError>() {
            for suggestion in store_error.recovery_suggestions() {
                eprintln!("  Suggestion: {suggestion}");
            }
        }
        std::process::exit(1);
    }
}
