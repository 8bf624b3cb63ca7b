//! Query-time retrieval.
//!
//! A [`Retriever`] embeds the query and asks the [`VectorIndex`] for its
//! top-k nearest points. The first call lazily verifies that the index is
//! reachable and the collection exists; concurrent first calls share a single
//! initialization attempt. A failed attempt is not cached, so the next call
//! tries again.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::embedding::EmbeddingClient;
use crate::error::{GatewayError, Result};
use crate::index::VectorIndex;
use crate::models::{CollectionInfo, RetrievalResult};

pub struct Retriever {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    ready: OnceCell<CollectionInfo>,
}

/// Snapshot of the index as seen by the retriever.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub ready: bool,
    pub connected: bool,
    pub collection: String,
    pub point_count: u64,
    pub status: String,
}

impl Retriever {
    pub fn new(embedder: EmbeddingClient, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            ready: OnceCell::new(),
        }
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Verify the index and collection. Idempotent and single-flight.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Index`] when the backend is unreachable or the
    /// collection has not been ingested yet.
    pub async fn initialize(&self) -> Result<&CollectionInfo> {
        self.ready
            .get_or_try_init(|| async {
                if !self.index.health_check().await {
                    return Err(GatewayError::Index(
                        "vector index is not reachable".to_string(),
                    ));
                }
                let info = self.index.collection_info().await?.ok_or_else(|| {
                    GatewayError::Index(format!(
                        "collection '{}' not found; run ingestion first",
                        self.index.collection_name()
                    ))
                })?;
                info!(
                    collection = self.index.collection_name(),
                    points = info.points_count,
                    dimension = info.dimension,
                    "retriever initialized"
                );
                Ok(info)
            })
            .await
    }

    /// Top `k` chunks for `query`, highest score first.
    pub async fn retrieve_relevant(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.initialize().await?;

        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.search(&embedding.vector, k).await?;

        let mut results: Vec<RetrievalResult> = hits.into_iter().map(RetrievalResult::from).collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        debug!(
            query_len = query.len(),
            results = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieval complete"
        );
        Ok(results)
    }

    /// Like [`retrieve_relevant`](Self::retrieve_relevant) but only the texts.
    pub async fn retrieve_texts(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_relevant(query, k)
            .await?
            .into_iter()
            .map(|r| r.text)
            .collect())
    }

    /// Live collection statistics. Never errors.
    pub async fn stats(&self) -> IndexStats {
        let collection = self.index.collection_name().to_string();
        let connected = self.index.health_check().await;
        let info = if connected {
            self.index.collection_info().await.ok().flatten()
        } else {
            None
        };

        match info {
            Some(info) => IndexStats {
                ready: self.is_ready(),
                connected,
                collection,
                point_count: info.points_count,
                status: info.status,
            },
            None => IndexStats {
                ready: self.is_ready(),
                connected,
                collection,
                point_count: 0,
                status: if connected { "missing" } else { "unreachable" }.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingBackend, RetryPolicy};
    use crate::index::MemoryIndex;
    use crate::models::{ChunkPayload, Embedding, IndexPoint, ScoredPoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Embeds text as a fixed 2-d vector chosen by keyword.
    struct KeywordBackend;

    #[async_trait]
    impl EmbeddingBackend for KeywordBackend {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed_once(&self, text: &str) -> Result<Embedding> {
            if text.contains("remote") {
                Ok(Embedding::new(vec![0.0, 1.0]))
            } else {
                Ok(Embedding::new(vec![1.0, 0.0]))
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    /// Counts `collection_info` calls and slows them down to widen races.
    struct CountingIndex {
        inner: MemoryIndex,
        info_calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        fn collection_name(&self) -> &str {
            self.inner.collection_name()
        }
        async fn health_check(&self) -> bool {
            self.inner.health_check().await
        }
        async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.collection_info().await
        }
        async fn ensure_collection(&self, dimension: usize) -> Result<()> {
            self.inner.ensure_collection(dimension).await
        }
        async fn delete_collection(&self) -> Result<()> {
            self.inner.delete_collection().await
        }
        async fn upsert_batch(&self, points: &[IndexPoint]) -> Result<()> {
            self.inner.upsert_batch(points).await
        }
        async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
            self.inner.search(vector, limit).await
        }
    }

    fn point(id: u64, text: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            id,
            vector,
            payload: ChunkPayload {
                text: text.to_string(),
                index: id as usize,
                length: text.chars().count(),
            },
        }
    }

    async fn seeded_index() -> MemoryIndex {
        let index = MemoryIndex::new("docs");
        index.ensure_collection(2).await.unwrap();
        index
            .upsert_batch(&[
                point(0, "Leave policy: 20 days", vec![1.0, 0.0]),
                point(1, "Remote work: 2 days/week", vec![0.0, 1.0]),
                point(2, "Mixed benefits", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        index
    }

    fn embedder() -> EmbeddingClient {
        EmbeddingClient::new(Arc::new(KeywordBackend), RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_retrieve_sorted_and_bounded() {
        let retriever = Retriever::new(embedder(), Arc::new(seeded_index().await));

        let results = retriever.retrieve_relevant("remote days?", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "Remote work: 2 days/week");
        assert_eq!(results[1].text, "Mixed benefits");
        assert!(results[0].score >= results[1].score);

        let texts = retriever.retrieve_texts("remote", 10).await.unwrap();
        assert_eq!(texts.len(), 3);
        assert!(retriever.is_ready());
    }

    #[tokio::test]
    async fn test_missing_collection_fails_and_retries_later() {
        let index = Arc::new(MemoryIndex::new("docs"));
        let retriever = Retriever::new(embedder(), index.clone());

        let err = retriever.retrieve_relevant("x", 3).await.unwrap_err();
        assert!(matches!(err, GatewayError::Index(_)));
        assert!(!retriever.is_ready());

        index.ensure_collection(2).await.unwrap();
        assert!(retriever.retrieve_relevant("x", 3).await.unwrap().is_empty());
        assert!(retriever.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_initialize_once() {
        let index = Arc::new(CountingIndex {
            inner: seeded_index().await,
            info_calls: AtomicUsize::new(0),
        });
        let retriever = Arc::new(Retriever::new(embedder(), index.clone()));

        let calls = (0..8).map(|_| {
            let r = retriever.clone();
            tokio::spawn(async move { r.retrieve_relevant("remote", 1).await })
        });
        for handle in futures::future::join_all(calls).await {
            assert_eq!(handle.unwrap().unwrap().len(), 1);
        }
        assert_eq!(index.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stats_reflect_index() {
        let index = Arc::new(seeded_index().await);
        let retriever = Retriever::new(embedder(), index.clone());

        let stats = retriever.stats().await;
        assert!(stats.connected);
        assert!(!stats.ready);
        assert_eq!(stats.point_count, 3);
        assert_eq!(stats.collection, "docs");

        index.set_reachable(false);
        let stats = retriever.stats().await;
        assert!(!stats.connected);
        assert_eq!(stats.status, "unreachable");
        assert_eq!(stats.point_count, 0);
    }
}
