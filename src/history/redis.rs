use async_trait::async_trait;
use crate::history::{ sort_newest_first, ConversationStore, StoreError };
use crate::models::chat::{ ChatMessage, ConversationRecord, ConversationSummary };
use crate::models::lead::LeadRecord;
use chrono::Utc;
use log::{ error, warn };
use redis::{ Client, AsyncCommands };

/// Each conversation is one JSON document under `<prefix><id>`; a sorted set
/// `<prefix>index` scored by creation time drives listing.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}index", self.key_prefix)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let raw: Option<String> = conn.get(self.record_key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        record: &ConversationRecord
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let _: () = conn.set(self.record_key(&record.id), json).await?;
        let _: () = conn.zadd(
            self.index_key(),
            &record.id,
            record.created_at.timestamp_millis()
        ).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn create(&self, record: ConversationRecord) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        self.save(&mut conn, &record).await
    }

    async fn get(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let mut conn = self.get_connection().await?;
        self.load(&mut conn, id).await
    }

    async fn set_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let mut record = self
            .load(&mut conn, id).await?
            .unwrap_or_else(|| ConversationRecord::new(id));
        record.messages = messages;
        record.updated_at = Utc::now();
        self.save(&mut conn, &record).await
    }

    async fn set_analysis(&self, id: &str, analysis: LeadRecord) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let mut record = self
            .load(&mut conn, id).await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.lead_analysis = Some(analysis);
        record.updated_at = Utc::now();
        self.save(&mut conn, &record).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.del(self.record_key(id)).await?;
        let _: () = conn.zrem(self.index_key(), id).await?;
        Ok(removed > 0)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.index_key(), 0, -1).await?;
        let mut summaries = Vec::with_capacity(ids.len());

        for id in &ids {
            match self.load(&mut conn, id).await {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {
                    warn!("Index entry '{}' has no record, dropping it", id);
                    let _: () = conn.zrem(self.index_key(), id).await?;
                }
                Err(StoreError::Serialization(e)) => {
                    error!("Error parsing conversation record '{}': {}", id, e);
                }
                Err(e) => return Err(e),
            }
        }

        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn ping(&self) -> bool {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis ping failed: {}", e);
                return false;
            }
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Redis ping failed: {}", e);
                false
            }
        }
    }
}
