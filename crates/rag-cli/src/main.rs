use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use common::{ChunkRecord, collections::CollectionRegistry, config::AppConfig};
use search_core::{Backends, TextNormalizer};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "rag-retrieve")]
#[command(about = "Hybrid BM25 + vector retrieval over chunk collections")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "rag.toml")]
    config: PathBuf,
    /// Log at debug level regardless of the configured level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the normalized form of a text, as indexed and queried.
    Normalize { text: String },
    /// Run a hybrid query and print the retrieved chunks as JSON.
    Query {
        text: String,
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Index a JSON Lines file of pre-chunked records into both stores.
    Index {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        lexical_only: bool,
    },
    /// List registered collections and whether their backing stores exist.
    Collections,
    /// Print the JSON schema of the result types.
    Schema,
}

#[derive(Debug, Args)]
struct Target {
    /// Collection name from the registry.
    #[arg(long, conflicts_with_all = ["lexical_index", "vector_collection"])]
    collection: Option<String>,
    #[arg(long, requires = "vector_collection")]
    lexical_index: Option<String>,
    #[arg(long, requires = "lexical_index")]
    vector_collection: Option<String>,
}

impl Target {
    fn resolve(&self, config: &AppConfig) -> anyhow::Result<(String, String)> {
        match (&self.collection, &self.lexical_index, &self.vector_collection) {
            (Some(name), _, _) => {
                let registry = CollectionRegistry::load(Path::new(&config.collections_path))?;
                let pair = registry.get(name)?;
                Ok((pair.lexical_index.clone(), pair.vector_collection.clone()))
            }
            (None, Some(lexical), Some(vector)) => Ok((lexical.clone(), vector.clone())),
            _ => bail!("pass --collection or both --lexical-index and --vector-collection"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Normalize { text } => normalize(&config, &text),
        Commands::Query {
            text,
            target,
            top_k,
        } => query(&config, &text, &target, top_k).await,
        Commands::Index {
            input,
            target,
            lexical_only,
        } => index(&config, &input, &target, lexical_only).await,
        Commands::Collections => collections(&config).await,
        Commands::Schema => schema(),
    }
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::WARN)
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .json()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn normalize(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let normalizer = TextNormalizer::from_settings(&config.retriever)?;
    println!("{}", normalizer.normalize(text));
    Ok(())
}

async fn query(
    config: &AppConfig,
    text: &str,
    target: &Target,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let (lexical_index, vector_collection) = target.resolve(config)?;
    let retriever = Backends::from_config(config)?.retriever();
    let top_k = top_k.unwrap_or(config.retriever.default_top_k);
    let chunks = retriever
        .retrieve(text, &lexical_index, &vector_collection, top_k)
        .await?;
    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

async fn index(
    config: &AppConfig,
    input: &Path,
    target: &Target,
    lexical_only: bool,
) -> anyhow::Result<()> {
    let (lexical_index, vector_collection) = target.resolve(config)?;
    let records = read_records(input)?;
    let indexer = Backends::from_config(config)?.indexer(lexical_only);
    let report = indexer
        .index(&records, &lexical_index, &vector_collection)
        .await
        .context("indexing failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_records(input: &Path) -> anyhow::Result<Vec<ChunkRecord>> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<ChunkRecord>(line)
                .with_context(|| format!("{}:{}: invalid chunk record", input.display(), idx + 1))
        })
        .collect()
}

async fn collections(config: &AppConfig) -> anyhow::Result<()> {
    let registry = CollectionRegistry::load(Path::new(&config.collections_path))?;
    let backends = Backends::from_config(config)?;

    let mut entries = Vec::new();
    for (name, pair) in registry.iter() {
        let lexical_exists = backends.lexical_store.exists(&pair.lexical_index).await.ok();
        let vector_exists = backends
            .vector_store
            .collection_exists(&pair.vector_collection)
            .await
            .ok();
        entries.push(serde_json::json!({
            "name": name,
            "lexical_index": pair.lexical_index,
            "vector_collection": pair.vector_collection,
            "lexical_exists": lexical_exists,
            "vector_exists": vector_exists,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn schema() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&common::schema_bundle())?);
    Ok(())
}
