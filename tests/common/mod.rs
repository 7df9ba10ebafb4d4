#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{ to_bytes, Body },
    http::{ header, Method, Request, StatusCode },
    Router,
};
use serde_json::Value as JsonValue;
use std::error::Error as StdError;
use std::sync::{ Arc, Mutex };
use tower::ServiceExt;

use nio_assistant::analysis::AnalysisService;
use nio_assistant::config::prompt::PromptConfig;
use nio_assistant::history::{ ConversationStore, MemoryConversationStore };
use nio_assistant::llm::chat::{ CompletionClient, CompletionRequest, CompletionResponse };
use nio_assistant::locks::KeyedLocks;
use nio_assistant::server::api::{ chat_rate_limiter, router, AppState };
use nio_assistant::session::SessionService;
use nio_assistant::webhook::{ WebhookNotifier, WebhookPayload };

/// Replies with `chat_reply` to chat turns and `analysis_reply` to extraction calls.
pub struct FakeCompletion {
    pub chat_reply: String,
    pub analysis_reply: String,
    pub calls: Mutex<usize>,
}

impl FakeCompletion {
    pub fn new(chat_reply: &str, analysis_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            chat_reply: chat_reply.to_string(),
            analysis_reply: analysis_reply.to_string(),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(
        &self,
        request: &CompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        *self.calls.lock().unwrap() += 1;
        let response = if request.system_prompt.contains("JSON schema") {
            self.analysis_reply.clone()
        } else {
            self.chat_reply.clone()
        };
        Ok(CompletionResponse { response })
    }

    fn get_model(&self) -> String {
        "fake".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

pub struct FakeWebhook {
    pub answer: Option<JsonValue>,
    pub payloads: Mutex<Vec<WebhookPayload>>,
}

#[async_trait]
impl WebhookNotifier for FakeWebhook {
    async fn notify(&self, payload: &WebhookPayload) -> Option<JsonValue> {
        self.payloads.lock().unwrap().push(payload.clone());
        self.answer.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryConversationStore>,
    pub completion: Arc<FakeCompletion>,
    pub webhook: Arc<FakeWebhook>,
}

pub struct TestOptions {
    pub with_completion: bool,
    pub webhook_answer: Option<JsonValue>,
    pub rate_limit: u32,
    pub auto_analyze: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            with_completion: true,
            webhook_answer: None,
            rate_limit: 0,
            auto_analyze: false,
        }
    }
}

pub fn test_app(analysis_reply: &str, options: TestOptions) -> TestApp {
    let store = Arc::new(MemoryConversationStore::new());
    let completion = FakeCompletion::new("Xin chào, tôi có thể giúp gì?", analysis_reply);
    let webhook = Arc::new(FakeWebhook {
        answer: options.webhook_answer,
        payloads: Mutex::new(Vec::new()),
    });

    let client: Option<Arc<dyn CompletionClient>> = if options.with_completion {
        Some(completion.clone())
    } else {
        None
    };
    let prompts = Arc::new(PromptConfig::default());
    let locks = Arc::new(KeyedLocks::new());
    let shared_store: Arc<dyn ConversationStore> = store.clone();

    let state = AppState {
        session: SessionService::new(shared_store.clone(), client.clone(), prompts.clone(), locks.clone()),
        analysis: AnalysisService::new(shared_store, client, Some(webhook.clone()), prompts, locks),
        limiter: chat_rate_limiter(options.rate_limit),
        auto_analyze: options.auto_analyze,
    };

    TestApp {
        router: router(state),
        store,
        completion,
        webhook,
    }
}

pub async fn send(app: &TestApp, method: Method, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { JsonValue::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}
