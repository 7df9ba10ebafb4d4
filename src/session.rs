use crate::config::prompt::PromptConfig;
use crate::history::{ ConversationStore, StoreError };
use crate::llm::chat::{ CompletionClient, CompletionRequest };
use crate::locks::KeyedLocks;
use crate::models::chat::{ ChatMessage, ConversationRecord, ConversationSummary };

use chrono::Utc;
use log::{ info, warn, error };
use std::sync::Arc;
use uuid::Uuid;

/// `<unix millis>-<11 random base-16 chars>`. Unique enough for chat threads,
/// not a security token.
pub fn generate_conversation_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..11])
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub id: String,
    /// False when the store refused the record and the id only lives client-side.
    pub persisted: bool,
}

/// Creates conversations and runs chat turns against the completion API.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn ConversationStore>,
    completion: Option<Arc<dyn CompletionClient>>,
    prompts: Arc<PromptConfig>,
    locks: Arc<KeyedLocks>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        completion: Option<Arc<dyn CompletionClient>>,
        prompts: Arc<PromptConfig>,
        locks: Arc<KeyedLocks>
    ) -> Self {
        Self { store, completion, prompts, locks }
    }

    pub fn completion_configured(&self) -> bool {
        self.completion.is_some()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Creates an empty conversation. The system prompt is not stored; it is
    /// prepended on every completion call instead.
    pub async fn start(&self) -> StartedSession {
        let id = generate_conversation_id();
        info!("Creating new conversation: {}", id);

        match self.store.create(ConversationRecord::new(id.clone())).await {
            Ok(()) => StartedSession { id, persisted: true },
            Err(e) => {
                warn!("Conversation {} not persisted, continuing without history: {}", id, e);
                StartedSession { id, persisted: false }
            }
        }
    }

    /// Runs one turn and returns the assistant reply.
    ///
    /// Never fails: an unreadable history counts as empty, a failed or
    /// unconfigured completion yields a canned reply, and a failed write is
    /// logged. Turns on the same id are serialized.
    pub async fn append_turn(&self, id: &str, user_text: &str) -> String {
        let _turn = self.locks.lock(id).await;

        let mut messages = match self.store.get(id).await {
            Ok(Some(record)) => record.messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Could not load history for {}, starting fresh: {}", id, e);
                Vec::new()
            }
        };
        messages.push(ChatMessage::user(user_text));

        let reply = self.generate_reply(id, &messages).await;
        messages.push(ChatMessage::assistant(reply.clone()));

        if let Err(e) = self.store.set_messages(id, messages).await {
            error!("Failed to save conversation {}: {}", id, e);
        }

        reply
    }

    async fn generate_reply(&self, id: &str, history: &[ChatMessage]) -> String {
        let Some(client) = &self.completion else {
            info!("Processing message for {} (fallback mode)", id);
            return self.prompts.pick_fallback().to_string();
        };

        info!("Processing message for {}", id);
        let request = CompletionRequest::new(self.prompts.chat_system_prompt.clone(), history.to_vec());
        match client.complete(&request).await {
            Ok(resp) => resp.response,
            Err(e) => {
                warn!("Completion failed for {}, using fallback reply: {}", id, e);
                self.prompts.pick_fallback().to_string()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        self.store.list().await
    }

    /// Removes the whole record; `StoreError::NotFound` if there was none.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.locks.lock(id).await;
        if self.store.delete(id).await? {
            info!("Deleted conversation {}", id);
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryConversationStore;
    use crate::models::chat::Role;
    use crate::test_support::{ FailingStore, ScriptedCompletion };

    fn service(completion: Option<Arc<dyn CompletionClient>>) -> (SessionService, Arc<MemoryConversationStore>) {
        let store = Arc::new(MemoryConversationStore::new());
        let svc = SessionService::new(
            store.clone(),
            completion,
            Arc::new(PromptConfig::default()),
            Arc::new(KeyedLocks::new())
        );
        (svc, store)
    }

    #[test]
    fn ids_have_timestamp_and_suffix() {
        let id = generate_conversation_id();
        let (ts, suffix) = id.split_once('-').unwrap();
        assert!(ts.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 11);
        assert_ne!(id, generate_conversation_id());
    }

    #[tokio::test]
    async fn start_persists_empty_record() {
        let (svc, store) = service(None);
        let started = svc.start().await;
        assert!(started.persisted);
        let record = store.get(&started.id).await.unwrap().unwrap();
        assert!(record.messages.is_empty());
        assert!(record.lead_analysis.is_none());
    }

    #[tokio::test]
    async fn start_degrades_when_store_fails() {
        let svc = SessionService::new(
            Arc::new(FailingStore),
            None,
            Arc::new(PromptConfig::default()),
            Arc::new(KeyedLocks::new())
        );
        let started = svc.start().await;
        assert!(!started.persisted);
        assert!(!started.id.is_empty());
    }

    #[tokio::test]
    async fn first_turn_on_unknown_id_stores_user_then_assistant() {
        let completion = ScriptedCompletion::replying(["Chào bạn!"]);
        let (svc, store) = service(Some(completion.clone()));

        let reply = svc.append_turn("new-session", "xin chào").await;
        assert_eq!(reply, "Chào bạn!");

        let record = store.get("new-session").await.unwrap().unwrap();
        let pairs: Vec<(Role, &str)> = record.messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(pairs, vec![(Role::User, "xin chào"), (Role::Assistant, "Chào bạn!")]);
    }

    #[tokio::test]
    async fn system_prompt_is_sent_but_not_stored() {
        let completion = ScriptedCompletion::replying(["ok"]);
        let (svc, store) = service(Some(completion.clone()));
        svc.append_turn("c1", "hello").await;

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system_prompt.contains("Vietnamese"));
        assert_eq!(requests[0].messages.len(), 1);

        let record = store.get("c1").await.unwrap().unwrap();
        assert!(record.messages.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn n_turns_alternate_starting_with_user() {
        let completion = ScriptedCompletion::replying(["a1", "a2", "a3"]);
        let (svc, store) = service(Some(completion.clone()));
        for text in ["u1", "u2", "u3"] {
            svc.append_turn("c1", text).await;
        }

        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 6);
        for (i, message) in record.messages.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(message.role, expected);
        }
        // Each call sees the full history so far, ending with the new user message.
        assert_eq!(completion.requests()[2].messages.len(), 5);
    }

    #[tokio::test]
    async fn completion_failure_yields_canned_reply() {
        let (svc, store) = service(Some(ScriptedCompletion::failing()));
        let reply = svc.append_turn("c1", "hello").await;

        let prompts = PromptConfig::default();
        assert!(prompts.fallback_responses.contains(&reply));
        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[1].content, reply);
    }

    #[tokio::test]
    async fn missing_completion_client_yields_canned_reply() {
        let (svc, _store) = service(None);
        assert!(!svc.completion_configured());
        let reply = svc.append_turn("c1", "hello").await;
        assert!(PromptConfig::default().fallback_responses.contains(&reply));
    }

    #[tokio::test]
    async fn store_outage_still_returns_reply() {
        let svc = SessionService::new(
            Arc::new(FailingStore),
            Some(ScriptedCompletion::replying(["still here"])),
            Arc::new(PromptConfig::default()),
            Arc::new(KeyedLocks::new())
        );
        assert_eq!(svc.append_turn("c1", "hello").await, "still here");
    }

    #[tokio::test]
    async fn concurrent_turns_on_same_id_both_land() {
        let completion = ScriptedCompletion::replying_slowly(["r1", "r2"], 10);
        let (svc, store) = service(Some(completion));

        let (a, b) = tokio::join!(svc.append_turn("c1", "first"), svc.append_turn("c1", "second"));
        assert!(!a.is_empty() && !b.is_empty());

        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 4);
        assert_eq!(record.messages[0].role, Role::User);
        assert_eq!(record.messages[2].role, Role::User);
        serde_json::to_string(&record).unwrap();
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let (svc, _store) = service(None);
        let started = svc.start().await;
        svc.delete(&started.id).await.unwrap();
        assert!(svc.get(&started.id).await.unwrap().is_none());
        assert!(matches!(svc.delete(&started.id).await, Err(StoreError::NotFound(_))));
    }
}
