use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::history::{ sort_newest_first, ConversationStore, StoreError };
use crate::models::chat::{ ChatMessage, ConversationRecord, ConversationSummary };
use crate::models::lead::LeadRecord;

/// Process-local store. Each instance owns its own map, so tests can build a
/// fresh one per case.
#[derive(Default)]
pub struct MemoryConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, record: ConversationRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn set_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(id.to_string())
            .or_insert_with(|| ConversationRecord::new(id));
        record.messages = messages;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_analysis(&self, id: &str, analysis: LeadRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.lead_analysis = Some(analysis);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut summaries: Vec<ConversationSummary> = self.records
            .read().await
            .values()
            .map(ConversationRecord::summary)
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}
