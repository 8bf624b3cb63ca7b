//! Qdrant [`VectorIndex`] backend over the REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | health | `GET /collections` |
//! | info | `GET /collections/{name}` (404 → absent) |
//! | create | `PUT /collections/{name}` |
//! | delete | `DELETE /collections/{name}` |
//! | upsert | `PUT /collections/{name}/points?wait=true` |
//! | search | `POST /collections/{name}/points/search` |
//!
//! Collections are created with cosine distance and an HNSW index
//! (`m = 16`, `ef_construct = 100`). When `api_key` is configured it is sent
//! as the `api-key` header on every request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::QdrantConfig;
use crate::error::{GatewayError, Result};
use crate::models::{ChunkPayload, CollectionInfo, IndexPoint, ScoredPoint};

use super::VectorIndex;

const HNSW_M: u32 = 16;
const HNSW_EF_CONSTRUCT: u32 = 100;
const INDEXING_THRESHOLD: u64 = 20_000;

pub struct QdrantIndex {
    http: reqwest::Client,
    url: String,
    collection: String,
}

/// Every Qdrant response wraps its payload in `result`.
#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionList {
    #[allow(dead_code)]
    collections: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
}

impl VectorsConfig {
    fn dimension(&self) -> usize {
        match self {
            VectorsConfig::Single(p) => p.size,
            VectorsConfig::Named(map) => map.values().next().map(|p| p.size).unwrap_or(0),
        }
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: &'a [IndexPoint],
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchHit {
    id: u64,
    score: f32,
    payload: Option<ChunkPayload>,
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = HeaderValue::from_str(&config.api_key)
                .map_err(|_| GatewayError::Config("qdrant.api_key is not a valid header value".to_string()))?;
            headers.insert("api-key", value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.url, self.collection, suffix)
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request
            .send()
            .await
            .map_err(|e| GatewayError::Index(format!("request to {} failed: {}", url, e)))
    }

    async fn expect_success<T: DeserializeOwned>(
        &self,
        what: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Index(format!(
                "{} failed with {}: {}",
                what, status, body_text
            )));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Index(format!("{}: invalid response: {}", what, e)))?;
        Ok(envelope.result)
    }

    async fn create_collection(&self, dimension: usize) -> Result<()> {
        info!(collection = %self.collection, dimension, "creating Qdrant collection");
        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" },
            "optimizers_config": { "indexing_threshold": INDEXING_THRESHOLD },
            "hnsw_config": { "m": HNSW_M, "ef_construct": HNSW_EF_CONSTRUCT },
        });
        let resp = self
            .send(Method::PUT, self.collection_url(""), Some(body))
            .await?;
        let _: serde_json::Value = self.expect_success("create collection", resp).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn health_check(&self) -> bool {
        match self
            .send(Method::GET, format!("{}/collections", self.url), None)
            .await
        {
            Ok(resp) => self
                .expect_success::<CollectionList>("list collections", resp)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let resp = self.send(Method::GET, self.collection_url(""), None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let desc: CollectionDescription = self.expect_success("get collection", resp).await?;
        Ok(Some(CollectionInfo {
            points_count: desc.points_count.unwrap_or(0),
            dimension: desc.config.params.vectors.dimension(),
            status: desc.status,
        }))
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        match self.collection_info().await? {
            Some(info) if info.dimension == dimension => {
                debug!(collection = %self.collection, "collection already exists");
                Ok(())
            }
            Some(info) => Err(GatewayError::Index(format!(
                "collection '{}' exists with dimension {}, requested {}; delete it first",
                self.collection, info.dimension, dimension
            ))),
            None => self.create_collection(dimension).await,
        }
    }

    async fn delete_collection(&self) -> Result<()> {
        let resp = self
            .send(Method::DELETE, self.collection_url(""), None)
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: serde_json::Value = self.expect_success("delete collection", resp).await?;
        info!(collection = %self.collection, "collection deleted");
        Ok(())
    }

    async fn upsert_batch(&self, points: &[IndexPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(UpsertRequest { points })
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let resp = self
            .send(Method::PUT, self.collection_url("/points?wait=true"), Some(body))
            .await?;
        let _: serde_json::Value = self.expect_success("upsert points", resp).await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let body = serde_json::to_value(SearchRequest {
            vector,
            limit,
            with_payload: true,
        })
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let resp = self
            .send(Method::POST, self.collection_url("/points/search"), Some(body))
            .await?;
        let hits: Vec<SearchHit> = self.expect_success("search", resp).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload = hit.payload.ok_or_else(|| {
                GatewayError::Index(format!("point {} has no payload", hit.id))
            })?;
            results.push(ScoredPoint {
                id: hit.id,
                score: hit.score,
                payload,
            });
        }
        Ok(results)
    }
}
