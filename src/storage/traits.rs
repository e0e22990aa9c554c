//! Vector store trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A point to be written: id, vector, and payload, stored atomically.
#[derive(Debug, Clone)]
pub struct Point {
    /// UUID string assigned on insertion
    pub id: String,
    /// Dense vector; dimension must match the collection
    pub vector: Vec<f32>,
    /// Arbitrary JSON payload
    pub payload: Map<String, Value>,
}

impl Point {
    pub fn new(id: String, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// A search hit: cosine similarity score plus payload.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// A scrolled point; vectors are not materialized.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub payload: Map<String, Value>,
}

/// Collection statistics for the `collection_info` procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    pub dimension: usize,
    pub distance: String,
}

/// A payload filter: conjunction of equality and numeric range conditions.
#[derive(Debug, Clone, Default)]
pub struct PayloadFilter {
    pub conditions: Vec<FilterCondition>,
}

/// A single filter condition.
#[derive(Debug, Clone)]
pub enum FilterCondition {
    /// Payload field equals the given value (string, integer, or bool).
    Matches { key: String, value: Value },
    /// Numeric payload field within `[gte, lt)`; either bound optional.
    Range {
        key: String,
        gte: Option<f64>,
        lt: Option<f64>,
    },
}

impl PayloadFilter {
    /// Filter on a single field equality.
    pub fn matches(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            conditions: vec![FilterCondition::Matches {
                key: key.into(),
                value: value.into(),
            }],
        }
    }

    /// Add an equality condition.
    pub fn and_matches(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FilterCondition::Matches {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Add a numeric range condition.
    pub fn and_range(mut self, key: impl Into<String>, gte: Option<f64>, lt: Option<f64>) -> Self {
        self.conditions.push(FilterCondition::Range {
            key: key.into(),
            gte,
            lt,
        });
        self
    }

    /// Whether a payload satisfies every condition. Used by the in-memory
    /// backend; the Qdrant backend translates conditions server-side.
    pub fn matches_payload(&self, payload: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|cond| match cond {
            FilterCondition::Matches { key, value } => payload.get(key) == Some(value),
            FilterCondition::Range { key, gte, lt } => {
                let Some(actual) = payload.get(key).and_then(Value::as_f64) else {
                    return false;
                };
                gte.map_or(true, |b| actual >= b) && lt.map_or(true, |b| actual < b)
            }
        })
    }
}

/// Trait over the vector database.
///
/// Scores returned by `search` are cosine similarities; with L2-normalized
/// vectors they land in [0, 1] in practice.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent collection creation with cosine distance.
    async fn ensure_collection(&self, name: &str, dimension: usize) -> crate::error::Result<()>;

    /// Write points; a batch either fully applies or fails as a whole.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> crate::error::Result<()>;

    /// ANN search, optionally filtered on payload.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> crate::error::Result<Vec<ScoredPoint>>;

    /// Metadata-filtered exact listing; vectors are not returned.
    async fn scroll(
        &self,
        collection: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> crate::error::Result<Vec<StoredPoint>>;

    /// Delete all points matching a filter.
    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> crate::error::Result<()>;

    /// Delete specific points by id (ingest rollback path).
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> crate::error::Result<()>;

    /// Remove a collection entirely.
    async fn drop_collection(&self, collection: &str) -> crate::error::Result<()>;

    /// Count points, optionally filtered.
    async fn count(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
    ) -> crate::error::Result<u64>;

    /// Collection statistics.
    async fn collection_info(&self, collection: &str) -> crate::error::Result<CollectionInfo>;
}
