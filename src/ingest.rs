//! Ingestion orchestration: chunks → embeddings → vector index.
//!
//! A run walks a fixed state machine:
//!
//! ```text
//! Idle → Connecting → DimensionProbe → CollectionSetup → EmbeddingUpserting → Complete
//!            │              │                 │                   │
//!            └──────────────┴─────────────────┴───────────────────┴──→ Failed
//! ```
//!
//! - **Connecting**: one health probe against the index, no retries.
//! - **DimensionProbe**: the first chunk is embedded alone; its length fixes
//!   the collection's vector size.
//! - **CollectionSetup**: the collection is deleted and recreated, so a run
//!   always leaves only its own points behind.
//! - **EmbeddingUpserting**: chunks are processed in super-batches. Inside a
//!   super-batch, embeddings are requested `concurrency` at a time and each
//!   window completes fully before the next starts. Points are then upserted
//!   in batches of `upsert_batch_size`.
//!
//! Any error aborts the run. Points upserted by earlier super-batches stay in
//! the collection; the next successful run replaces them.
//!
//! Only one run may target a collection at a time.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbeddingClient;
use crate::error::{GatewayError, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, IndexPoint};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Idle,
    Connecting,
    DimensionProbe,
    CollectionSetup,
    EmbeddingUpserting,
    Complete,
    Failed,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestPhase::Idle => "idle",
            IngestPhase::Connecting => "connecting",
            IngestPhase::DimensionProbe => "dimension probe",
            IngestPhase::CollectionSetup => "collection setup",
            IngestPhase::EmbeddingUpserting => "embedding and upserting",
            IngestPhase::Complete => "complete",
            IngestPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub concurrency: usize,
    pub upsert_batch_size: usize,
    pub super_batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            upsert_batch_size: 50,
            super_batch_size: 500,
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.ingest.concurrency.max(1),
            upsert_batch_size: config.ingest.upsert_batch_size.max(1),
            super_batch_size: config.ingest.super_batch_size.max(1),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Points in the collection after the run, as reported by the index.
    pub points_stored: u64,
    pub chunks: usize,
    pub dimension: usize,
    pub elapsed: Duration,
    pub throughput_per_min: f64,
}

pub struct Ingestor {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    options: IngestOptions,
    phase: Mutex<IngestPhase>,
}

impl Ingestor {
    pub fn new(embedder: EmbeddingClient, index: Arc<dyn VectorIndex>, options: IngestOptions) -> Self {
        Self {
            embedder,
            index,
            options,
            phase: Mutex::new(IngestPhase::Idle),
        }
    }

    pub fn phase(&self) -> IngestPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, phase: IngestPhase, progress: &dyn IngestProgressReporter) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        debug!(%phase, "ingest phase");
        progress.report(IngestProgressEvent::Phase(phase));
    }

    /// Rebuild the collection from `chunks`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Document`] if `chunks` is empty (the index is untouched)
    /// - [`GatewayError::Index`] if the index is unreachable or rejects a write
    /// - [`GatewayError::DimensionMismatch`] if the model changes vector size mid-run
    /// - the embedding client's final error once its retries are exhausted
    pub async fn run(&self, chunks: &[Chunk], progress: &dyn IngestProgressReporter) -> Result<IngestReport> {
        match self.run_phases(chunks, progress).await {
            Ok(report) => {
                self.enter(IngestPhase::Complete, progress);
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "ingestion failed");
                self.enter(IngestPhase::Failed, progress);
                Err(e)
            }
        }
    }

    async fn run_phases(&self, chunks: &[Chunk], progress: &dyn IngestProgressReporter) -> Result<IngestReport> {
        let first = chunks.first().ok_or_else(|| {
            GatewayError::Document("document produced no chunks; nothing to index".to_string())
        })?;

        self.enter(IngestPhase::Connecting, progress);
        if !self.index.health_check().await {
            return Err(GatewayError::Index(format!(
                "cannot connect to vector index for collection '{}'",
                self.index.collection_name()
            )));
        }

        self.enter(IngestPhase::DimensionProbe, progress);
        let dimension = self.embedder.embed(&first.text).await?.dimension();
        info!(dimension, model = self.embedder.model_name(), "embedding dimension detected");

        self.enter(IngestPhase::CollectionSetup, progress);
        self.index.delete_collection().await?;
        self.index.ensure_collection(dimension).await?;
        info!(collection = self.index.collection_name(), dimension, "collection recreated");

        self.enter(IngestPhase::EmbeddingUpserting, progress);
        let started = Instant::now();
        let total = chunks.len() as u64;
        let mut uploaded = 0u64;

        for (batch_no, super_batch) in chunks.chunks(self.options.super_batch_size).enumerate() {
            let points = self
                .embed_super_batch(super_batch, dimension, uploaded, total, progress)
                .await?;

            for batch in points.chunks(self.options.upsert_batch_size) {
                self.index.upsert_batch(batch).await?;
            }
            uploaded += super_batch.len() as u64;
            progress.report(IngestProgressEvent::Uploaded { n: uploaded, total });
            debug!(batch = batch_no, uploaded, total, "super-batch stored");
        }

        let elapsed = started.elapsed();
        let points_stored = match self.index.collection_info().await? {
            Some(info) => info.points_count,
            None => uploaded,
        };
        let minutes = elapsed.as_secs_f64() / 60.0;
        let throughput_per_min = if minutes > 0.0 {
            chunks.len() as f64 / minutes
        } else {
            0.0
        };

        info!(
            points = points_stored,
            dimension,
            elapsed_secs = elapsed.as_secs_f64(),
            chunks_per_min = throughput_per_min.round(),
            "ingestion complete"
        );

        Ok(IngestReport {
            points_stored,
            chunks: chunks.len(),
            dimension,
            elapsed,
            throughput_per_min,
        })
    }

    /// Embed one super-batch window by window.
    async fn embed_super_batch(
        &self,
        super_batch: &[Chunk],
        dimension: usize,
        done_before: u64,
        total: u64,
        progress: &dyn IngestProgressReporter,
    ) -> Result<Vec<IndexPoint>> {
        let mut points = Vec::with_capacity(super_batch.len());
        for window in super_batch.chunks(self.options.concurrency) {
            let results = join_all(window.iter().map(|c| self.embedder.embed(&c.text))).await;
            for (chunk, result) in window.iter().zip(results) {
                let embedding = result?;
                if embedding.dimension() != dimension {
                    return Err(GatewayError::DimensionMismatch {
                        expected: dimension,
                        actual: embedding.dimension(),
                    });
                }
                points.push(IndexPoint::from_chunk(chunk, embedding));
            }
            progress.report(IngestProgressEvent::Embedding {
                n: done_before + points.len() as u64,
                total,
            });
        }
        Ok(points)
    }
}

/// Read a UTF-8 document and chunk it.
///
/// An empty result is an error: indexing nothing would silently wipe the
/// collection on the next run.
pub async fn load_chunks(path: &Path, chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GatewayError::Document(format!("failed to read {}: {}", path.display(), e)))?;
    let size_mb = text.len() as f64 / (1024.0 * 1024.0);
    let chunks = chunk_text(&text, chunking.chunk_size, chunking.overlap);
    info!(
        path = %path.display(),
        size_mb = %format!("{:.2}", size_mb),
        chunks = chunks.len(),
        "document chunked"
    );
    if chunks.is_empty() {
        return Err(GatewayError::Document(format!(
            "{} produced no chunks",
            path.display()
        )));
    }
    Ok(chunks)
}

/// Read, chunk, and index the document at `path`.
pub async fn ingest_document(
    path: &Path,
    chunking: &ChunkingConfig,
    ingestor: &Ingestor,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    let chunks = load_chunks(path, chunking).await?;
    ingestor.run(&chunks, progress).await
}
