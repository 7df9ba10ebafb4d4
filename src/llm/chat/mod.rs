pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// One completion call: a system prompt followed by the ordered history.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// Builds a client for `config`, or `None` when the provider needs a
/// credential that was not supplied.
pub fn new_client(
    config: &LlmConfig
) -> Result<Option<Arc<dyn CompletionClient>>, Box<dyn StdError + Send + Sync>> {
    if config.llm_type.requires_api_key() && config.api_key.is_none() {
        return Ok(None);
    }
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAIChatClient::from_config(config)?);
    Ok(Some(client))
}
