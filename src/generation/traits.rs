//! Generator trait and message types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Speaker role in a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a generation request: an optional single leading system
/// message followed by interleaved user/assistant turns in chronological
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Capability: turn a message list into a completion.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> crate::error::Result<String>;
}

/// Enforce a context budget by dropping the oldest non-system messages
/// first. The system message and the final message always survive.
pub fn truncate_to_budget(messages: &[ChatMessage], budget_chars: usize) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = messages.to_vec();

    let total = |msgs: &[ChatMessage]| msgs.iter().map(|m| m.content.chars().count()).sum::<usize>();

    while total(&kept) > budget_chars {
        // First droppable message: oldest non-system that is not the last
        let candidate = kept
            .iter()
            .position(|m| m.role != Role::System)
            .filter(|&i| i + 1 < kept.len());
        match candidate {
            Some(i) => {
                kept.remove(i);
            }
            None => break,
        }
    }

    kept
}
