//! Offline batch processor.
//!
//! Converts every PDF in a directory, classifies its sections and writes a
//! JSON report. With `--graph`, metadata is also extracted and the
//! relationship graph written alongside.
//!
//!   papergraph-batch data --filter hyperdrive -o processed_papers.json
//!   papergraph-batch data --graph graph.json --mode researcher

use anyhow::{Context, Result};
use clap::Parser;
use papergraph_common::{Mode, Paper, Section, SectionMap};
use papergraph_config::Config;
use papergraph_db::{ContentStore, MemoryStore};
use papergraph_ingestion::{build_converter, classify, content_hash, is_pdf_filename, section_summary};
use papergraph_kg::{prepare_paper_text, truncate_text, GraphOptions, MetadataExtractor, RelationshipSynthesizer};
use papergraph_llm::{select_backend, select_embedder, NoopObserver, RetryPolicy};
use papergraph_web::offline::{index_and_build, ExtractedPaper};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "papergraph-batch")]
#[command(author, version, about = "Batch process research papers through the ingestion pipeline")]
struct Cli {
    /// Directory containing PDF files
    #[arg(default_value = "data")]
    data_dir: PathBuf,

    /// Only process files whose name contains this text (case-insensitive)
    #[arg(short, long)]
    filter: Option<String>,

    /// Output JSON report
    #[arg(short, long, default_value = "processed_papers.json")]
    output: PathBuf,

    /// Save each converted Markdown document into this directory
    #[arg(long, value_name = "DIR")]
    save_markdown: Option<PathBuf>,

    /// Also extract metadata and write the relationship graph here
    #[arg(long, value_name = "FILE")]
    graph: Option<PathBuf>,

    /// Prompt mode used with --graph
    #[arg(long, default_value = "student")]
    mode: Mode,

    /// Confidence threshold used with --graph
    #[arg(long)]
    threshold: Option<f64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FileReport {
    Success {
        filename: String,
        sections: SectionMap,
        section_sizes: BTreeMap<Section, usize>,
    },
    Error {
        filename: String,
        error_type: &'static str,
        error_msg: String,
    },
}

impl FileReport {
    fn is_success(&self) -> bool {
        matches!(self, FileReport::Success { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let default_filter = if cli.verbose { "papergraph=debug,info" } else { config.server.log_filter.as_str() };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let failed = run(&cli, &config).await?;
    if failed > 0 {
        error!(failed, "Some files failed");
        std::process::exit(1);
    }
    Ok(())
}

/// Returns the number of files that failed.
async fn run(cli: &Cli, config: &Config) -> Result<usize> {
    let pdfs = list_pdfs(&cli.data_dir, cli.filter.as_deref())?;
    if pdfs.is_empty() {
        warn!(dir = %cli.data_dir.display(), "No PDF files found to process");
        return Ok(0);
    }
    info!(files = pdfs.len(), "Starting batch processing");

    if let Some(dir) = &cli.save_markdown {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let converter = build_converter(&config.ingestion, &config.keys);
    let mut reports = Vec::with_capacity(pdfs.len());
    let mut converted: Vec<(PathBuf, SectionMap)> = Vec::new();

    for (i, path) in pdfs.iter().enumerate() {
        let filename = file_name(path);
        info!("[{}/{}] {}", i + 1, pdfs.len(), filename);
        match converter.convert(path).await {
            Ok(markdown) => {
                if let Some(dir) = &cli.save_markdown {
                    let debug_path = dir.join(format!("{filename}.md"));
                    if let Err(e) = std::fs::write(&debug_path, &markdown) {
                        warn!(path = %debug_path.display(), error = %e, "Could not save Markdown");
                    }
                }
                let sections = classify(&markdown);
                reports.push(FileReport::Success {
                    filename,
                    section_sizes: section_summary(&sections),
                    sections: sections.clone(),
                });
                converted.push((path.clone(), sections));
            }
            Err(e) => {
                error!(file = %filename, error = %e, "Ingestion failed");
                reports.push(FileReport::Error { filename, error_type: "ingestion", error_msg: e.to_string() });
            }
        }
    }

    write_json(&cli.output, &reports)?;
    let ok = reports.iter().filter(|r| r.is_success()).count();
    info!(ok, total = reports.len(), output = %cli.output.display(), "Batch complete");

    if let Some(graph_path) = &cli.graph {
        build_graph(cli, config, &converted, graph_path).await?;
    }
    Ok(reports.len() - ok)
}

async fn build_graph(
    cli: &Cli,
    config: &Config,
    converted: &[(PathBuf, SectionMap)],
    out: &Path,
) -> Result<()> {
    let backend = select_backend(&config.llm, &config.keys)?;
    let extractor = MetadataExtractor::new(backend.clone())
        .with_policy(RetryPolicy::from(&config.retry.extraction))
        .with_max_chars(config.ingestion.max_text_chars)
        .with_generation(config.llm.max_tokens, config.llm.temperature);
    let synthesizer = RelationshipSynthesizer::new(backend)
        .with_policy(RetryPolicy::from(&config.retry.synthesis))
        .with_generation(config.llm.max_tokens, config.llm.temperature);
    let embedder = select_embedder(&config.embedding, &config.keys);
    let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new().with_embedder(embedder));

    let mut papers = Vec::new();
    for (path, sections) in converted {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let text = truncate_text(&prepare_paper_text(sections), config.ingestion.max_text_chars);
        match extractor.extract(&text, cli.mode, &NoopObserver).await {
            Ok(metadata) => papers.push(ExtractedPaper {
                paper: Paper::new(content_hash(&bytes))
                    .with_display_name(file_name(path))
                    .with_file_path(path)
                    .with_metadata(metadata),
                text,
            }),
            Err(e) => warn!(file = %path.display(), error = %e, "Extraction failed"),
        }
    }

    let threshold = cli.threshold.unwrap_or(config.graph.batch_confidence_threshold);
    let opts = GraphOptions::from_config(&config.graph, threshold);
    let graph = index_and_build(Arc::new(synthesizer), store, &papers, cli.mode, &opts).await;
    write_json(out, &graph)?;
    info!(nodes = graph.nodes.len(), edges = graph.edges.len(), output = %out.display(), "Graph written");
    Ok(())
}

fn list_pdfs(dir: &Path, filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let needle = filter.map(str::to_lowercase);
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_pdf_filename(&file_name(p)))
        .filter(|p| match &needle {
            Some(n) => file_name(p).to_lowercase().contains(n.as_str()),
            None => true,
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
