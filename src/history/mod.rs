mod memory;
mod redis;

pub use memory::MemoryConversationStore;
pub use self::redis::RedisConversationStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, ConversationRecord, ConversationSummary, Role };
use crate::models::lead::LeadRecord;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),
    #[error("conversation store backend error: {0}")]
    Backend(String),
    #[error("conversation record encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Persistence contract shared by every conversation backend.
///
/// Writes replace full state; there is no incremental append.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short backend label reported by the health endpoint.
    fn backend(&self) -> &'static str;

    async fn create(&self, record: ConversationRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError>;

    /// Replaces the message list, creating the record if the id is unknown.
    async fn set_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError>;

    /// Fails with `StoreError::NotFound` if the id is unknown.
    async fn set_analysis(&self, id: &str, analysis: LeadRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Summaries ordered by creation time, newest first.
    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    async fn ping(&self) -> bool {
        true
    }
}

pub fn sort_newest_first(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

pub fn create_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryConversationStore::new())),
        "redis" => {
            let store = RedisConversationStore::new(
                &args.history_host,
                &args.history_redis_prefix
            )?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    if args.history_type.eq_ignore_ascii_case("memory") {
        info!("Conversations will be kept in memory only");
    } else {
        info!("Conversations will be stored in: {} at {}", args.history_type, args.history_host);
    }
    create_conversation_store(args)
}

/// Plain-text transcript handed to the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub user_count: usize,
    pub assistant_count: usize,
}

/// Interleaves user and assistant messages pairwise (`User: ...` then
/// `Assistant: ...`). The longer side keeps contributing after the shorter
/// one runs out. System messages are dropped.
pub fn format_transcript(messages: &[ChatMessage]) -> Transcript {
    let user: Vec<&ChatMessage> = messages.iter().filter(|m| m.role == Role::User).collect();
    let assistant: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .collect();

    let mut text = String::new();
    for i in 0..user.len().max(assistant.len()) {
        if let Some(msg) = user.get(i) {
            text.push_str(&format!("User: {}\n", msg.content));
        }
        if let Some(msg) = assistant.get(i) {
            text.push_str(&format!("Assistant: {}\n", msg.content));
        }
    }

    Transcript {
        text,
        user_count: user.len(),
        assistant_count: assistant.len(),
    }
}
