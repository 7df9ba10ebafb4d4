//! Fakes shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use crate::history::{ ConversationStore, StoreError };
use crate::llm::chat::{ CompletionClient, CompletionRequest, CompletionResponse };
use crate::models::chat::{ ChatMessage, ConversationRecord, ConversationSummary };
use crate::models::lead::LeadRecord;
use crate::webhook::{ WebhookNotifier, WebhookPayload };

/// Completion client that plays back canned replies, repeating the last one
/// once the queue runs dry.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
    fail: bool,
}

impl ScriptedCompletion {
    fn build<I, S>(replies: I, delay: Option<Duration>, fail: bool) -> Arc<Self>
        where I: IntoIterator<Item = S>, S: Into<String>
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay,
            fail,
        })
    }

    pub fn replying<I, S>(replies: I) -> Arc<Self> where I: IntoIterator<Item = S>, S: Into<String> {
        Self::build(replies, None, false)
    }

    pub fn replying_slowly<I, S>(replies: I, delay_ms: u64) -> Arc<Self>
        where I: IntoIterator<Item = S>, S: Into<String>
    {
        Self::build(replies, Some(Duration::from_millis(delay_ms)), false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(Vec::<String>::new(), None, true)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        request: &CompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err("scripted completion failure".into());
        }

        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        let response = last.clone().ok_or("no scripted reply")?;
        Ok(CompletionResponse { response })
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

/// Store whose backend is always down.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Backend("store unavailable".to_string())
}

#[async_trait]
impl ConversationStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn create(&self, _record: ConversationRecord) -> Result<(), StoreError> {
        Err(down())
    }

    async fn get(&self, _id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        Err(down())
    }

    async fn set_messages(&self, _id: &str, _messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        Err(down())
    }

    async fn set_analysis(&self, _id: &str, _analysis: LeadRecord) -> Result<(), StoreError> {
        Err(down())
    }

    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        Err(down())
    }

    async fn ping(&self) -> bool {
        false
    }
}

/// Webhook that records payloads and answers with a fixed body.
pub struct RecordingWebhook {
    answer: Option<JsonValue>,
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl RecordingWebhook {
    pub fn answering(answer: Option<JsonValue>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookNotifier for RecordingWebhook {
    async fn notify(&self, payload: &WebhookPayload) -> Option<JsonValue> {
        self.payloads.lock().unwrap().push(payload.clone());
        self.answer.clone()
    }
}
