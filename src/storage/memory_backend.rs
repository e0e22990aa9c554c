//! In-process vector store.
//!
//! A faithful implementation of [`VectorStore`] over plain memory: linear
//! cosine scan for search, insertion-ordered scroll. Tests assemble the
//! whole core around it; it also serves single-node embedded deployments
//! where running Qdrant is not worth the operational weight.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{Result, StorageError};
use crate::storage::{
    CollectionInfo, PayloadFilter, Point, ScoredPoint, StoredPoint, VectorStore,
};

struct Collection {
    dimension: usize,
    /// Insertion-ordered entries; replaced in place on id collision.
    entries: Vec<Entry>,
}

struct Entry {
    id: String,
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Collection) -> T,
    ) -> Result<T> {
        let collections = self.collections.read();
        let collection = collections
            .get(name)
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;
        Ok(f(collection))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write();
        collections.entry(name.to_string()).or_insert(Collection {
            dimension,
            entries: Vec::new(),
        });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before mutating so a bad point cannot
        // leave a partial write behind.
        for point in &points {
            if point.vector.len() != col.dimension {
                return Err(StorageError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: col.dimension,
                    got: point.vector.len(),
                }
                .into());
            }
        }

        for point in points {
            match col.entries.iter_mut().find(|e| e.id == point.id) {
                Some(existing) => {
                    existing.vector = point.vector;
                    existing.payload = point.payload;
                }
                None => col.entries.push(Entry {
                    id: point.id,
                    vector: point.vector,
                    payload: point.payload,
                }),
            }
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        self.with_collection(collection, |col| {
            let mut scored: Vec<ScoredPoint> = col
                .entries
                .iter()
                .filter(|e| filter.map_or(true, |f| f.matches_payload(&e.payload)))
                .map(|e| ScoredPoint {
                    id: e.id.clone(),
                    score: cosine_similarity(vector, &e.vector),
                    payload: e.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            scored
        })
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        self.with_collection(collection, |col| {
            col.entries
                .iter()
                .filter(|e| filter.matches_payload(&e.payload))
                .take(limit)
                .map(|e| StoredPoint {
                    id: e.id.clone(),
                    payload: e.payload.clone(),
                })
                .collect()
        })
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        col.entries.retain(|e| !filter.matches_payload(&e.payload));
        Ok(())
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        col.entries.retain(|e| !ids.contains(&e.id));
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().remove(collection);
        Ok(())
    }

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        self.with_collection(collection, |col| {
            col.entries
                .iter()
                .filter(|e| filter.map_or(true, |f| f.matches_payload(&e.payload)))
                .count() as u64
        })
    }

    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        self.with_collection(collection, |col| CollectionInfo {
            name: collection.to_string(),
            points_count: col.entries.len() as u64,
            dimension: col.dimension,
            distance: "cosine".to_string(),
        })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
