use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sift_core::store::{DocumentStore, PostingStore};
use sift_core::{Config, IndexBuilder, InvertedIndex, QueryEngine, RawDocument, SearchRequest, SledStore};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPORT_FILE: &str = "build-report.json";

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect the positional search index", long_about = None)]
struct Cli {
    /// JSON config file; missing keys use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents from a JSON/JSONL file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Store directory
        #[arg(long, env = "SIFT_STORE", default_value = "data/store")]
        store: PathBuf,
        /// Where to write the build report (defaults to the store directory)
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Apply popularity scores from a JSON object of url -> score
    Popularity {
        #[arg(long)]
        scores: PathBuf,
        #[arg(long, env = "SIFT_STORE", default_value = "data/store")]
        store: PathBuf,
    },
    /// Print term and document counts
    Stats {
        #[arg(long, env = "SIFT_STORE", default_value = "data/store")]
        store: PathBuf,
    },
    /// Run a query against the store and print the response as JSON
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 0)]
        page_size: usize,
        #[arg(long, env = "SIFT_STORE", default_value = "data/store")]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Build { input, store, report } => build(&config, &input, &store, report),
        Commands::Popularity { scores, store } => popularity(&scores, &store),
        Commands::Stats { store } => stats(&store),
        Commands::Search { query, page, page_size, store } => search(&config, &store, SearchRequest { query, page, page_size }),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildSummary {
    started_at: String,
    finished_at: String,
    input: String,
    store: String,
    indexed: usize,
    total_words: usize,
    rejected: Vec<Rejection>,
    flushed_batches: u64,
    written_updates: u64,
    dropped_updates: u64,
}

#[derive(Serialize)]
struct Rejection {
    url: String,
    reason: String,
}

fn build(config: &Config, input: &Path, store_path: &Path, report_path: Option<PathBuf>) -> Result<()> {
    let started_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let docs = read_documents(input)?;
    tracing::info!(documents = docs.len(), input = %input.display(), "loaded documents");

    let store = Arc::new(SledStore::open(store_path)?);
    let index = Arc::new(InvertedIndex::new(store.clone(), &config.index)?);
    let builder = IndexBuilder::new(Arc::clone(&index), store.clone(), &config.index)?;
    let report = builder.build(&docs);
    index.close()?;
    let flush = index.flush_report();

    let summary = BuildSummary {
        started_at,
        finished_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
        input: input.display().to_string(),
        store: store_path.display().to_string(),
        indexed: report.indexed.len(),
        total_words: report.total_words(),
        rejected: report
            .rejected
            .iter()
            .map(|(url, e)| Rejection { url: url.clone(), reason: e.to_string() })
            .collect(),
        flushed_batches: flush.batches,
        written_updates: flush.written,
        dropped_updates: flush.dropped,
    };
    let report_path = report_path.unwrap_or_else(|| store_path.join(REPORT_FILE));
    fs::write(&report_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("writing {}", report_path.display()))?;

    tracing::info!(
        indexed = summary.indexed,
        rejected = summary.rejected.len(),
        terms = store.count()?,
        report = %report_path.display(),
        "index build complete"
    );
    Ok(())
}

/// Collect documents from a `.json` (object or array) or `.jsonl` file, or from
/// every such file below a directory. Unparseable records are skipped.
fn read_documents(input: &Path) -> Result<Vec<RawDocument>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", input.display());
    }

    let mut docs = Vec::new();
    for file in files {
        if extension(&file) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
    }
    Ok(docs)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|s| s.to_str())
}

fn read_jsonl(file: &Path, docs: &mut Vec<RawDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawDocument>(&line) {
            Ok(doc) => docs.push(doc),
            Err(e) => tracing::warn!(file = %file.display(), line = line_no + 1, error = %e, "skipping record"),
        }
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<RawDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    let values = match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => Vec::new(),
    };
    for value in values {
        match serde_json::from_value::<RawDocument>(value) {
            Ok(doc) => docs.push(doc),
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "skipping record"),
        }
    }
    Ok(())
}

fn popularity(scores_path: &Path, store_path: &Path) -> Result<()> {
    let raw = fs::read_to_string(scores_path).with_context(|| format!("reading {}", scores_path.display()))?;
    let scores: HashMap<String, f64> = serde_json::from_str(&raw)?;
    let store = SledStore::open(store_path)?;
    let updated = store.update_popularity_scores(&scores)?;
    PostingStore::flush(&store)?;
    println!("updated {updated} of {} documents", scores.len());
    Ok(())
}

fn stats(store_path: &Path) -> Result<()> {
    let store = SledStore::open(store_path)?;
    let stats = serde_json::json!({
        "terms": store.count()?,
        "documents": store.document_count(),
    });
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn search(config: &Config, store_path: &Path, request: SearchRequest) -> Result<()> {
    let store = Arc::new(SledStore::open(store_path)?);
    let index = Arc::new(InvertedIndex::new(store.clone(), &config.index)?);
    let engine = QueryEngine::new(Arc::clone(&index), store, &config.search)?;
    let response = engine.search(&request);
    println!("{}", serde_json::to_string_pretty(&response)?);
    index.close()?;
    Ok(())
}
