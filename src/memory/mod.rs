//! Session-scoped conversation memory.
//!
//! Messages live in a dedicated collection of the same vector store that
//! holds documents: one stateful dependency to operate, and the door stays
//! open for semantic search over history later. The store requires a
//! vector per point, so messages carry a zero dummy vector of the
//! collection dimension; the payload is the truth.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::storage::{PayloadFilter, Point, VectorStore};

/// Scroll page bound for session listings and sweeps.
const SCAN_LIMIT: usize = 10_000;

/// A message turn as returned by `history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    /// UTC seconds since the epoch, microsecond precision
    pub timestamp: f64,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Conversation history manager over the vector store.
pub struct ConversationMemory {
    store: Arc<dyn VectorStore>,
    collection: String,
    dimension: usize,
    max_history: usize,
    ttl: Duration,
}

impl ConversationMemory {
    pub fn new(store: Arc<dyn VectorStore>, config: &MemoryConfig, dimension: usize) -> Self {
        Self {
            store,
            collection: config.collection.clone(),
            dimension,
            max_history: config.max_history,
            ttl: Duration::from_secs(config.ttl_hours * 3600),
        }
    }

    /// Create the backing collection if needed. Called once at service
    /// startup.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.store
            .ensure_collection(&self.collection, self.dimension)
            .await
    }

    /// Append one message with a fresh id and server-assigned timestamp.
    /// Concurrent appends within a session order by these timestamps.
    pub async fn append(&self, session_id: &str, role: MessageRole, content: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let timestamp = now_epoch_seconds();

        let mut payload = Map::new();
        payload.insert("session_id".to_string(), json!(session_id));
        payload.insert("role".to_string(), json!(role.as_str()));
        payload.insert("content".to_string(), json!(content));
        payload.insert("timestamp".to_string(), json!(timestamp));

        let point = Point::new(id.clone(), vec![0.0; self.dimension], payload);
        self.store.upsert(&self.collection, vec![point]).await?;

        tracing::debug!(session_id, role = role.as_str(), "Stored conversation message");
        Ok(id)
    }

    /// The most recent `limit` messages of a session in chronological
    /// order, exactly as the user saw the conversation. Messages past the
    /// TTL are filtered out even before a sweep deletes them. Unknown
    /// sessions yield an empty history.
    pub async fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<StoredMessage>> {
        let limit = limit.unwrap_or(self.max_history);
        let cutoff = now_epoch_seconds() - self.ttl.as_secs_f64();

        let filter =
            PayloadFilter::matches("session_id", session_id).and_range("timestamp", Some(cutoff), None);

        let points = self.store.scroll(&self.collection, &filter, SCAN_LIMIT).await?;

        let mut messages: Vec<StoredMessage> = points
            .iter()
            .filter_map(|p| parse_message(&p.payload))
            .collect();

        messages.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }

        Ok(messages)
    }

    /// Delete every message of a session. Returns the number deleted.
    pub async fn clear(&self, session_id: &str) -> Result<u64> {
        let filter = PayloadFilter::matches("session_id", session_id);
        let count = self.store.count(&self.collection, Some(&filter)).await?;
        if count > 0 {
            self.store.delete(&self.collection, &filter).await?;
        }
        tracing::info!(session_id, deleted = count, "Cleared session history");
        Ok(count)
    }

    /// Delete all messages older than `max_age` across every session.
    /// Returns the number deleted.
    pub async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let cutoff = now_epoch_seconds() - max_age.as_secs_f64();
        let filter = PayloadFilter::default().and_range("timestamp", None, Some(cutoff));

        let count = self.store.count(&self.collection, Some(&filter)).await?;
        if count > 0 {
            self.store.delete(&self.collection, &filter).await?;
            tracing::info!(deleted = count, "Swept expired conversation messages");
        }
        Ok(count)
    }

    /// Sweep using the configured TTL.
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.sweep(self.ttl).await
    }

    /// Message count for a session, TTL-filtered.
    pub async fn session_message_count(&self, session_id: &str) -> Result<u64> {
        let filter = PayloadFilter::matches("session_id", session_id);
        self.store.count(&self.collection, Some(&filter)).await
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

fn parse_message(payload: &Map<String, Value>) -> Option<StoredMessage> {
    let role = match payload.get("role")?.as_str()? {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        other => {
            tracing::warn!(role = other, "Skipping message with unknown role");
            return None;
        }
    };
    Some(StoredMessage {
        role,
        content: payload.get("content")?.as_str()?.to_string(),
        timestamp: payload.get("timestamp")?.as_f64()?,
    })
}

fn now_epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn memory() -> ConversationMemory {
        let store = Arc::new(MemoryStore::new());
        let config = MemoryConfig::default();
        let memory = ConversationMemory::new(store, &config, 4);
        memory.ensure_ready().await.unwrap();
        memory
    }

    #[tokio::test]
    async fn test_append_and_history_order() {
        let memory = memory().await;
        memory.append("s1", MessageRole::User, "مرحبا").await.unwrap();
        memory
            .append("s1", MessageRole::Assistant, "مرحبا بك")
            .await
            .unwrap();
        memory.append("s1", MessageRole::User, "كيف الحال؟").await.unwrap();

        let history = memory.history("s1", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "مرحبا");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[2].content, "كيف الحال؟");
        // Non-decreasing timestamps
        for pair in history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let memory = memory().await;
        memory.append("s1", MessageRole::User, "one").await.unwrap();
        memory.append("s2", MessageRole::User, "two").await.unwrap();

        let h1 = memory.history("s1", None).await.unwrap();
        let h2 = memory.history("s2", None).await.unwrap();
        assert_eq!(h1.len(), 1);
        assert_eq!(h2.len(), 1);
        assert_eq!(h1[0].content, "one");
        assert_eq!(h2[0].content, "two");
    }

    #[tokio::test]
    async fn test_history_limit_keeps_most_recent() {
        let memory = memory().await;
        for i in 0..6 {
            memory
                .append("s1", MessageRole::User, &format!("m{i}"))
                .await
                .unwrap();
        }
        let history = memory.history("s1", Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m4");
        assert_eq!(history[1].content, "m5");
    }

    #[tokio::test]
    async fn test_unknown_session_empty() {
        let memory = memory().await;
        assert!(memory.history("nope", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_then_history_empty() {
        let memory = memory().await;
        memory.append("s1", MessageRole::User, "a").await.unwrap();
        memory.append("s1", MessageRole::Assistant, "b").await.unwrap();

        let deleted = memory.clear("s1").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(memory.history("s1", None).await.unwrap().is_empty());
        assert_eq!(memory.clear("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let memory = memory().await;
        memory.append("s1", MessageRole::User, "fresh").await.unwrap();

        // Nothing should be older than an hour
        let deleted = memory.sweep(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(deleted, 0);

        // Everything is older than zero seconds
        tokio::time::sleep(Duration::from_millis(5)).await;
        let deleted = memory.sweep(Duration::from_secs(0)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(memory.history("s1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_message_count() {
        let memory = memory().await;
        memory.append("s1", MessageRole::User, "a").await.unwrap();
        memory.append("s1", MessageRole::Assistant, "b").await.unwrap();
        assert_eq!(memory.session_message_count("s1").await.unwrap(), 2);
        assert_eq!(memory.session_message_count("s2").await.unwrap(), 0);
    }
}
