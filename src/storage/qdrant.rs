//! Qdrant vector database backend.

use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config::Config as VectorsConfigVariant, Condition, CountPointsBuilder,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct, PointsIdsList,
    Range, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};

use crate::config::QdrantConfig;
use crate::error::{DalilError, Result, StorageError};
use crate::retry::retry_with_backoff;
use crate::storage::{
    CollectionInfo, FilterCondition, PayloadFilter, Point, ScoredPoint, StoredPoint, VectorStore,
};

/// Store operations are retried once before the failure surfaces as
/// backend-unavailable.
const STORE_ATTEMPTS: u32 = 2;

fn is_store_error(err: &DalilError) -> bool {
    matches!(err, DalilError::Storage(_))
}

async fn once_retried<T, F, Fut>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_with_backoff(
        STORE_ATTEMPTS,
        Duration::from_millis(200),
        is_store_error,
        operation,
    )
    .await
}

/// Qdrant-backed vector store.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Connect to a Qdrant instance. Store operations are bounded by the
    /// configured timeout; the connection itself is lazy.
    pub fn connect(config: &QdrantConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let exists = collections.collections.iter().any(|c| c.name == name);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| StorageError::Index(e.to_string()))?;

            tracing::info!(collection = name, dimension, "Created Qdrant collection");
        }

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = Payload::try_from(Value::Object(p.payload))
                    .map_err(|e| StorageError::Index(e.to_string()))?;
                Ok(PointStruct::new(p.id, p.vector, payload))
            })
            .collect::<Result<_>>()?;

        let count = points.len();
        once_retried(|| async {
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points.clone()).wait(true))
                .await
                .map_err(|e| StorageError::Index(e.to_string()))?;
            Ok(())
        })
        .await?;

        tracing::debug!(collection, points = count, "Upserted points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let response = once_retried(|| async {
            let mut builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
                .with_payload(true);
            if let Some(filter) = filter {
                builder = builder.filter(to_qdrant_filter(filter));
            }
            self.client
                .search_points(builder)
                .await
                .map_err(|e| StorageError::Query(e.to_string()).into())
        })
        .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: point_id_string(point.id.as_ref()),
                score: point.score,
                payload: payload_to_json(&point.payload),
            })
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        let qdrant_filter = to_qdrant_filter(filter);
        let mut points = Vec::new();
        let mut offset: Option<qdrant_client::qdrant::PointId> = None;

        while points.len() < limit {
            let page = (limit - points.len()).min(1000) as u32;
            let response = once_retried(|| async {
                let mut builder = ScrollPointsBuilder::new(collection)
                    .filter(qdrant_filter.clone())
                    .limit(page)
                    .with_payload(true)
                    .with_vectors(false);
                if let Some(off) = offset.clone() {
                    builder = builder.offset(off);
                }
                self.client
                    .scroll(builder)
                    .await
                    .map_err(|e| StorageError::Query(e.to_string()).into())
            })
            .await?;

            for point in &response.result {
                points.push(StoredPoint {
                    id: point_id_string(point.id.as_ref()),
                    payload: payload_to_json(&point.payload),
                });
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(points)
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()> {
        once_retried(|| async {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(to_qdrant_filter(filter))
                        .wait(true),
                )
                .await
                .map_err(|e| StorageError::Index(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<qdrant_client::qdrant::PointId> =
            ids.iter().map(|id| id.clone().into()).collect();
        once_retried(|| async {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(PointsIdsList { ids: ids.clone() })
                        .wait(true),
                )
                .await
                .map_err(|e| StorageError::Index(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| StorageError::Index(e.to_string()))?;
        tracing::info!(collection, "Dropped collection");
        Ok(())
    }

    async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        let response = once_retried(|| async {
            let mut builder = CountPointsBuilder::new(collection).exact(true);
            if let Some(filter) = filter {
                builder = builder.filter(to_qdrant_filter(filter));
            }
            self.client
                .count(builder)
                .await
                .map_err(|e| StorageError::Query(e.to_string()).into())
        })
        .await?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let response = once_retried(|| async {
            self.client
                .collection_info(collection)
                .await
                .map_err(|e| StorageError::Query(e.to_string()).into())
        })
        .await?;

        let info = response
            .result
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;

        let dimension = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .map(|v| match v {
                VectorsConfigVariant::Params(params) => params.size as usize,
                VectorsConfigVariant::ParamsMap(_) => 0,
            })
            .unwrap_or(0);

        Ok(CollectionInfo {
            name: collection.to_string(),
            points_count: info.points_count.unwrap_or(0),
            dimension,
            distance: "cosine".to_string(),
        })
    }
}

/// Translate a payload filter into Qdrant filter conditions.
fn to_qdrant_filter(filter: &PayloadFilter) -> Filter {
    let conditions: Vec<Condition> = filter
        .conditions
        .iter()
        .map(|cond| match cond {
            FilterCondition::Matches { key, value } => match value {
                Value::Bool(b) => Condition::matches(key.clone(), *b),
                Value::Number(n) if n.is_i64() => {
                    Condition::matches(key.clone(), n.as_i64().unwrap_or_default())
                }
                Value::String(s) => Condition::matches(key.clone(), s.clone()),
                other => Condition::matches(key.clone(), other.to_string()),
            },
            FilterCondition::Range { key, gte, lt } => Condition::range(
                key.clone(),
                Range {
                    gte: *gte,
                    lt: *lt,
                    gt: None,
                    lte: None,
                },
            ),
        })
        .collect();

    Filter::must(conditions)
}

/// Render a Qdrant point id back into its string form.
fn point_id_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|i| i.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

/// Convert a Qdrant payload map into plain JSON.
fn payload_to_json(
    payload: &std::collections::HashMap<String, qdrant_client::qdrant::Value>,
) -> Map<String, Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
        .collect()
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}
