//! Prompt assets: Arabic-first system prompts, canned replies, and the
//! retrieval context formatter.

use serde_json::Value;

use crate::generation::ChatMessage;
use crate::memory::{MessageRole, StoredMessage};
use crate::retrieval::RetrievedChunk;

/// System prompt for retrieval-grounded answers.
pub const SYSTEM_QA: &str = "\
أنت مساعد ذكي يجيب على الأسئلة بالاعتماد على المستندات المتاحة فقط. \
أجب باللغة العربية الفصحى بشكل واضح ومباشر. \
إذا لم تجد الإجابة في المستندات المرفقة فقل ذلك صراحة ولا تخترع معلومات. \
Answer in Arabic unless the user writes in English; ground every claim in the provided context.";

/// System prompt for retrieval-free conversational turns.
pub const SYSTEM_CONVERSATIONAL: &str = "\
أنت مساعد ودود يجري محادثة طبيعية مع المستخدم. \
أجب بإيجاز وبنفس لغة المستخدم، ولا تدّعِ معرفة مستندات غير موجودة.";

/// Canned reply for greeting-routed queries; no generator call needed.
pub const GREETING_REPLY: &str = "مرحبا بك! كيف يمكنني مساعدتك اليوم؟";

/// Canned help reply for queries that normalize to nothing.
pub const EMPTY_QUERY_REPLY: &str = "من فضلك اكتب سؤالا حتى أستطيع مساعدتك.";

/// Reply for calculator inputs the evaluator rejects (division by zero).
pub const CALCULATION_FAILED_REPLY: &str = "تعذر حساب هذا التعبير.";

/// Note injected as context when the documents collection has nothing
/// relevant; the generator still runs and says so in its own words.
pub const NO_CONTEXT_NOTE: &str =
    "لا توجد مستندات ذات صلة في قاعدة المعرفة. أخبر المستخدم بذلك بلطف.";

/// Format retrieved chunks into a numbered, source-marked context block.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_NOTE.to_string();
    }

    let mut out = String::from("المستندات المتاحة:\n");
    for (i, chunk) in chunks.iter().enumerate() {
        let source = chunk
            .payload
            .get("source_name")
            .and_then(Value::as_str)
            .unwrap_or("غير معروف");
        out.push_str(&format!("\n[المصدر {}: {}]\n{}\n---\n", i + 1, source, chunk.content));
    }
    out
}

/// Assemble the message list for a rag-routed query:
/// system prompt + context, prior turns, then the user question.
pub fn build_rag_messages(
    context: &str,
    history: &[StoredMessage],
    query: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!("{SYSTEM_QA}\n\n{context}")));
    messages.extend(history.iter().map(history_message));
    messages.push(ChatMessage::user(query));
    messages
}

/// Assemble the message list for a simple conversational query.
pub fn build_simple_messages(history: &[StoredMessage], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_CONVERSATIONAL));
    messages.extend(history.iter().map(history_message));
    messages.push(ChatMessage::user(query));
    messages
}

fn history_message(message: &StoredMessage) -> ChatMessage {
    match message.role {
        MessageRole::User => ChatMessage::user(&message.content),
        MessageRole::Assistant => ChatMessage::assistant(&message.content),
    }
}
