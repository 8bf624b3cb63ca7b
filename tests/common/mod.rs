#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rag_gateway::embedding::{EmbeddingBackend, EmbeddingClient, RetryPolicy};
use rag_gateway::error::{GatewayError, RemoteService, Result};
use rag_gateway::index::{MemoryIndex, VectorIndex};
use rag_gateway::models::Embedding;
use rag_gateway::pipeline::{Backends, RagPipeline};
use rag_gateway::synthesize::Generator;

pub const DIMENSION: usize = 32;

/// Hashed bag-of-words embedding. Texts sharing words point the same way.
pub struct BagOfWordsEmbedder {
    pub calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % (DIMENSION - 1);
        v[bucket] += 1.0;
    }
    // Keeps every vector non-zero.
    v[DIMENSION - 1] = 0.1;
    v
}

#[async_trait]
impl EmbeddingBackend for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed_once(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding::new(bag_of_words(text)))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Records every prompt and answers with a fixed string.
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub healthy: AtomicBool,
    pub fail: AtomicBool,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            fail: AtomicBool::new(false),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub const GENERATED_ANSWER: &str = "Employees may work remotely 2 days per week.";

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable {
                service: RemoteService::Generation,
                message: "cannot connect to Ollama".to_string(),
            });
        }
        Ok(GENERATED_ANSWER.to_string())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub embedder: Arc<BagOfWordsEmbedder>,
    pub generator: Arc<RecordingGenerator>,
    pub index: Arc<MemoryIndex>,
    pub backends: Backends,
}

impl Harness {
    pub fn new() -> Self {
        let embedder = Arc::new(BagOfWordsEmbedder::new());
        let generator = Arc::new(RecordingGenerator::new());
        let index = Arc::new(MemoryIndex::new("hr_documents"));
        let index_dyn: Arc<dyn VectorIndex> = index.clone();
        let backends = Backends {
            embedder: EmbeddingClient::new(embedder.clone(), RetryPolicy::default()),
            generator: generator.clone(),
            index: index_dyn,
        };
        Self {
            embedder,
            generator,
            index,
            backends,
        }
    }

    pub fn pipeline(&self, top_k: usize) -> RagPipeline {
        RagPipeline::new(self.backends.clone(), top_k, 1000)
    }
}

pub const HANDBOOK: &str =
    "Leave policy: employees get 20 days.\n\nRemote work: allowed 2 days/week.";
