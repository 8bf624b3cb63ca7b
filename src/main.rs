//! # RAG Gateway CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest <path>` | Chunk a document, embed it, and rebuild the collection |
//! | `rag ask "<question>"` | Answer a question from the indexed document |
//! | `rag search "<query>"` | Show the top matching chunks with scores |
//! | `rag serve` | Start the HTTP API |
//! | `rag health` | Check Ollama and Qdrant reachability |
//!
//! Environment variables (`OLLAMA_URL`, `QDRANT_URL`, `CHUNK_SIZE`, ...)
//! override the config file.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use rag_gateway::config;
use rag_gateway::ingest::ingest_document;
use rag_gateway::logging;
use rag_gateway::pipeline::{Backends, RagPipeline};
use rag_gateway::progress::{format_number, ProgressMode};
use rag_gateway::server;

/// RAG gateway: grounded answers over a local document with Ollama and Qdrant.
#[derive(Parser)]
#[command(name = "rag", version)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the collection from a text document.
    ///
    /// Deletes the existing collection, so only one ingestion may run at a time.
    Ingest {
        /// UTF-8 text file to index.
        path: PathBuf,

        /// Progress output on stderr: `human`, `json`, or `off`.
        /// Defaults to `human` on a terminal, otherwise `off`.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Answer a question.
    Ask {
        question: String,
    },

    /// Retrieve the closest chunks without generating an answer.
    Search {
        query: String,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP server.
    Serve,

    /// Report dependency health. Exits non-zero when degraded.
    Health,
}

fn parse_progress(mode: Option<&str>) -> anyhow::Result<ProgressMode> {
    match mode {
        None => Ok(ProgressMode::default_for_tty()),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some("off") => Ok(ProgressMode::Off),
        Some(other) => bail!(
            "Unknown progress mode: '{}'. Must be human, json, or off.",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.server);

    match cli.command {
        Commands::Ingest { path, progress } => {
            let mode = parse_progress(progress.as_deref())?;
            let backends = Backends::from_config(&cfg)?;
            let ingestor = backends.ingestor(&cfg);

            let reporter = mode.reporter();
            let report = ingest_document(&path, &cfg.chunking, &ingestor, reporter.as_ref())
                .await
                .with_context(|| format!("failed to ingest {}", path.display()))?;

            println!("ingest {}", path.display());
            println!("  collection:     {}", cfg.qdrant.collection);
            println!("  vectors stored: {}", format_number(report.points_stored));
            println!("  dimension:      {}", report.dimension);
            println!("  duration:       {:.2} min", report.elapsed.as_secs_f64() / 60.0);
            println!("  speed:          {:.0} chunks/min", report.throughput_per_min);
        }
        Commands::Ask { question } => {
            let pipeline = RagPipeline::from_config(&cfg)?;
            let outcome = pipeline.ask(&question).await?;
            println!("{}", outcome.answer.trim());
            eprintln!(
                "\ncontext found: {}  chunks used: {}  time: {} ms",
                outcome.metadata.context_found,
                outcome.metadata.chunks_used.unwrap_or(0),
                outcome.metadata.processing_time_ms
            );
        }
        Commands::Search { query, limit } => {
            let pipeline = RagPipeline::from_config(&cfg)?;
            let limit = limit.unwrap_or(cfg.retrieval.top_k);
            let results = pipeline.search(&query, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, r.score, r.text.replace('\n', " "));
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Health => {
            let pipeline = RagPipeline::from_config(&cfg)?;
            let report = pipeline.health().await;
            let up = |b: bool| if b { "up" } else { "down" };
            println!("embedding:  {} ({})", up(report.embedding), cfg.ollama.embedding_model);
            println!("generation: {} ({})", up(report.generation), cfg.ollama.model);
            println!(
                "index:      {} ({}, {} vectors, {})",
                up(report.index.connected),
                report.index.collection,
                format_number(report.index.point_count),
                report.index.status
            );
            if !report.is_healthy() {
                bail!("degraded");
            }
            println!("healthy");
        }
    }

    Ok(())
}
