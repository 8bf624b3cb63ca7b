//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers every storage operation the ingestion
//! and retrieval pipelines need, so the Qdrant backend can be swapped for the
//! in-memory one in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`health_check`](VectorIndex::health_check) | Liveness probe, never errors |
//! | [`collection_info`](VectorIndex::collection_info) | Point count and dimension, `None` if absent |
//! | [`ensure_collection`](VectorIndex::ensure_collection) | Idempotent create with cosine distance |
//! | [`delete_collection`](VectorIndex::delete_collection) | Drop the collection and its points |
//! | [`upsert_batch`](VectorIndex::upsert_batch) | Insert or overwrite points by id, durably |
//! | [`search`](VectorIndex::search) | Top-k nearest points by cosine similarity |
//!
//! Implementations must be `Send + Sync` to be shared across request handlers.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CollectionInfo, IndexPoint, ScoredPoint};

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Name of the collection this index operates on.
    fn collection_name(&self) -> &str;

    async fn health_check(&self) -> bool;

    async fn collection_info(&self) -> Result<Option<CollectionInfo>>;

    /// Create the collection if absent.
    ///
    /// No-op when it exists with the same dimension; an error when it exists
    /// with a different one (delete it first).
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Delete the collection. Deleting an absent collection succeeds.
    async fn delete_collection(&self) -> Result<()>;

    /// Insert or overwrite points. Returns once the write is durable.
    async fn upsert_batch(&self, points: &[IndexPoint]) -> Result<()>;

    /// Return at most `limit` points in descending score order.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;
}
