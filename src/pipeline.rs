//! Question answering: validate → retrieve → synthesize.
//!
//! [`Backends`] builds the production wiring (one Ollama client shared by
//! embedding and generation, Qdrant as the index) from [`Config`]. Tests
//! assemble [`RagPipeline`] directly from fakes.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::embedding::{EmbeddingClient, RetryPolicy};
use crate::error::{GatewayError, Result};
use crate::index::{QdrantIndex, VectorIndex};
use crate::ingest::{IngestOptions, Ingestor};
use crate::models::RetrievalResult;
use crate::ollama::OllamaClient;
use crate::retrieve::{IndexStats, Retriever};
use crate::synthesize::{synthesize_answer, Generator};

/// Remote services a pipeline or ingestor talks to.
#[derive(Clone)]
pub struct Backends {
    pub embedder: EmbeddingClient,
    pub generator: Arc<dyn Generator>,
    pub index: Arc<dyn VectorIndex>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Result<Self> {
        let ollama = Arc::new(OllamaClient::new(&config.ollama)?);
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&config.qdrant)?);
        Ok(Self {
            embedder: EmbeddingClient::new(ollama.clone(), RetryPolicy::from_config(&config.embedding)),
            generator: ollama,
            index,
        })
    }

    pub fn ingestor(&self, config: &Config) -> Ingestor {
        Ingestor::new(
            self.embedder.clone(),
            self.index.clone(),
            IngestOptions::from_config(config),
        )
    }
}

/// Answer plus metadata; serialized as the `data` field of `/ask-hr`.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub metadata: AskMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskMetadata {
    pub context_found: bool,
    /// Present only when context was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub embedding: bool,
    pub generation: bool,
    pub index: IndexStats,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.embedding && self.generation && self.index.connected && self.index.ready
    }
}

pub struct RagPipeline {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    max_question_chars: usize,
}

impl RagPipeline {
    pub fn new(backends: Backends, top_k: usize, max_question_chars: usize) -> Self {
        Self {
            retriever: Arc::new(Retriever::new(backends.embedder, backends.index)),
            generator: backends.generator,
            top_k,
            max_question_chars,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Backends::from_config(config)?,
            config.retrieval.top_k,
            config.server.max_question_chars,
        ))
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn max_question_chars(&self) -> usize {
        self.max_question_chars
    }

    /// Answer `question` from the indexed document.
    pub async fn ask(&self, question: &str) -> Result<AskOutcome> {
        let started = Instant::now();
        let question = validate_text(question, self.max_question_chars)?;

        let preview: String = question.chars().take(100).collect();
        info!(question = %preview, "processing question");

        let chunks = self.retriever.retrieve_texts(&question, self.top_k).await?;
        let answer = synthesize_answer(self.generator.as_ref(), &question, &chunks).await?;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        if answer.context_found {
            info!(processing_time_ms, context_chunks = answer.chunks_used, "question answered");
        }

        Ok(AskOutcome {
            answer: answer.text,
            metadata: AskMetadata {
                context_found: answer.context_found,
                chunks_used: answer.context_found.then_some(answer.chunks_used),
                processing_time_ms,
            },
        })
    }

    /// Retrieval only, with scores. Used by the `search` command.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievalResult>> {
        let query = validate_text(query, self.max_question_chars)?;
        self.retriever.retrieve_relevant(&query, limit).await
    }

    pub async fn health(&self) -> HealthReport {
        let embedding = self.retriever.embedder().health_check().await;
        let generation = self.generator.health_check().await;
        let mut index = self.retriever.stats().await;
        if index.connected && !index.ready {
            index.ready = self.retriever.initialize().await.is_ok();
        }
        HealthReport {
            embedding,
            generation,
            index,
        }
    }
}

/// Validate the `question` field of a request body.
///
/// Missing, `null`, `false`, `0`, and `""` are all "required"; any other
/// non-string is rejected. Returns the trimmed question.
pub fn validate_question(raw: Option<&Value>, max_chars: usize) -> Result<String> {
    let value = match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Err(required()),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => return Err(required()),
        Some(v) => v,
    };
    match value {
        Value::String(s) if s.is_empty() => Err(required()),
        Value::String(s) => validate_text(s, max_chars),
        _ => Err(GatewayError::Validation("Question must be a string".to_string())),
    }
}

fn required() -> GatewayError {
    GatewayError::Validation("Question is required".to_string())
}

fn validate_text(question: &str, max_chars: usize) -> Result<String> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation("Question cannot be empty".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(GatewayError::Validation(format!(
            "Question must be less than {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}
