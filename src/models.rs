//! Core data models used throughout the gateway.
//!
//! These types represent the chunks, vectors, index points, and retrieval
//! results that flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};

/// A segment of a source document produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Zero-based position in the chunker's output; becomes the point id.
    pub index: usize,
    /// Length of `text` in characters.
    pub length: usize,
}

impl Chunk {
    pub fn new(index: usize, text: String) -> Self {
        let length = text.chars().count();
        Self {
            text,
            index,
            length,
        }
    }
}

/// A dense vector produced by the embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Payload stored alongside every vector in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub index: usize,
    pub length: usize,
}

impl From<&Chunk> for ChunkPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            index: chunk.index,
            length: chunk.length,
        }
    }
}

/// A vector plus payload, ready to be upserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl IndexPoint {
    pub fn from_chunk(chunk: &Chunk, embedding: Embedding) -> Self {
        Self {
            id: chunk.index as u64,
            vector: embedding.vector,
            payload: ChunkPayload::from(chunk),
        }
    }
}

/// A search hit returned by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Summary of a collection as reported by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimension: usize,
    pub status: String,
}

/// A retrieved text segment with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub text: String,
    pub score: f32,
}

impl From<ScoredPoint> for RetrievalResult {
    fn from(point: ScoredPoint) -> Self {
        Self {
            text: point.payload.text,
            score: point.score,
        }
    }
}
