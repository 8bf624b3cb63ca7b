//! In-memory [`VectorIndex`] implementation.
//!
//! Holds a single collection behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector. Reachability can
//! be toggled to exercise the unreachable-backend paths of the pipeline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{GatewayError, Result};
use crate::models::{CollectionInfo, IndexPoint, ScoredPoint};

use super::VectorIndex;

struct Collection {
    dimension: usize,
    points: BTreeMap<u64, IndexPoint>,
}

pub struct MemoryIndex {
    name: String,
    collection: RwLock<Option<Collection>>,
    reachable: AtomicBool,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: RwLock::new(None),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going down (`false`) or coming back (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Ids of all stored points, ascending.
    pub fn point_ids(&self) -> Vec<u64> {
        self.read()
            .as_ref()
            .map(|c| c.points.keys().copied().collect())
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Index(format!(
                "memory index '{}' is unreachable",
                self.name
            )))
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Collection>> {
        self.collection.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Collection>> {
        self.collection.write().unwrap_or_else(|e| e.into_inner())
    }

    fn missing(&self) -> GatewayError {
        GatewayError::Index(format!("collection '{}' not found", self.name))
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        self.check_reachable()?;
        Ok(self.read().as_ref().map(|c| CollectionInfo {
            points_count: c.points.len() as u64,
            dimension: c.dimension,
            status: "green".to_string(),
        }))
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        self.check_reachable()?;
        let mut guard = self.write();
        if let Some(existing) = guard.as_ref() {
            if existing.dimension == dimension {
                return Ok(());
            }
            return Err(GatewayError::Index(format!(
                "collection '{}' exists with dimension {}, requested {}; delete it first",
                self.name, existing.dimension, dimension
            )));
        }
        *guard = Some(Collection {
            dimension,
            points: BTreeMap::new(),
        });
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.check_reachable()?;
        *self.write() = None;
        Ok(())
    }

    async fn upsert_batch(&self, points: &[IndexPoint]) -> Result<()> {
        self.check_reachable()?;
        let mut guard = self.write();
        let collection = guard.as_mut().ok_or_else(|| self.missing())?;
        for p in points {
            if p.vector.len() != collection.dimension {
                return Err(GatewayError::DimensionMismatch {
                    expected: collection.dimension,
                    actual: p.vector.len(),
                });
            }
        }
        for p in points {
            collection.points.insert(p.id, p.clone());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        self.check_reachable()?;
        let guard = self.read();
        let collection = guard.as_ref().ok_or_else(|| self.missing())?;
        if vector.len() != collection.dimension {
            return Err(GatewayError::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|p| ScoredPoint {
                id: p.id,
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
