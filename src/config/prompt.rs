use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use rand::seq::SliceRandom;

const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are NiO, a helpful AI assistant. You help customers with their questions and provide excellent service. Always respond in Vietnamese unless the customer asks in English.";

const DEFAULT_ANALYSIS_PROMPT: &str = r#"Extract the following customer details from the transcript:
- Name
- Email address
- Phone number
- Industry
- Problems, needs, and goals summary
- Availability
- Whether they have booked a consultation (true/false)
- Any special notes
- Lead quality (categorize as 'good', 'ok', or 'spam')

Format the response using this JSON schema:
{
  "type": "object",
  "properties": {
    "customerName": { "type": "string" },
    "customerEmail": { "type": "string" },
    "customerPhone": { "type": "string" },
    "customerIndustry": { "type": "string" },
    "customerProblem": { "type": "string" },
    "customerAvailability": { "type": "string" },
    "customerConsultation": { "type": "boolean" },
    "specialNotes": { "type": "string" },
    "leadQuality": { "type": "string", "enum": ["good", "ok", "spam"] }
  },
  "required": ["customerName", "customerEmail", "customerProblem", "leadQuality"]
}

IMPORTANT:
- If the user provided contact details, set lead quality to "good"; otherwise, "spam".
- Return ONLY the JSON object, no additional text or explanations.
- Use English for all field values regardless of the conversation language.

Analyze this conversation transcript and return only the JSON object:"#;

const DEFAULT_FALLBACK_RESPONSES: [&str; 5] = [
    "Xin chào! Tôi là NiO Assistant. Hiện tại tôi đang ở chế độ demo. Bạn có thể hỏi tôi bất cứ điều gì và tôi sẽ cố gắng trả lời hữu ích nhất có thể.",
    "Cảm ơn bạn đã liên hệ! Tôi là trợ lý AI của NiO. Hiện tại tôi đang trong chế độ demo, nhưng tôi vẫn có thể giúp bạn với các câu hỏi cơ bản.",
    "Chào bạn! Tôi là NiO Assistant. Mặc dù tôi đang ở chế độ demo, tôi vẫn có thể hỗ trợ bạn. Bạn cần gì không?",
    "Xin chào! Tôi là trợ lý AI của NiO. Hiện tại tôi đang được cấu hình, nhưng tôi vẫn có thể trò chuyện với bạn. Bạn muốn hỏi gì không?",
    "Cảm ơn bạn đã sử dụng NiO Assistant! Tôi đang trong chế độ demo và sẵn sàng hỗ trợ bạn với các câu hỏi.",
];

#[derive(Debug)]
pub enum PromptError {
    EmptyPrompt(String),
    NoFallbackResponses,
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyPrompt(key) => write!(f, "Prompt '{}' is empty", key),
            PromptError::NoFallbackResponses => write!(f, "At least one fallback response is required"),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Prompts used by the chat and analysis passes.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub chat_system_prompt: String,
    pub analysis_prompt: String,
    pub fallback_responses: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            chat_system_prompt: DEFAULT_CHAT_SYSTEM_PROMPT.to_string(),
            analysis_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
            fallback_responses: DEFAULT_FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.chat_system_prompt.trim().is_empty() {
            return Err(PromptError::EmptyPrompt("chat_system_prompt".to_string()));
        }
        if self.analysis_prompt.trim().is_empty() {
            return Err(PromptError::EmptyPrompt("analysis_prompt".to_string()));
        }
        if self.fallback_responses.is_empty() {
            return Err(PromptError::NoFallbackResponses);
        }
        if self.fallback_responses.iter().any(|r| r.trim().is_empty()) {
            return Err(PromptError::EmptyPrompt("fallback_responses".to_string()));
        }
        Ok(())
    }

    /// Random pick from the canned replies; the first built-in reply if the list was emptied.
    pub fn pick_fallback(&self) -> &str {
        self.fallback_responses
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_FALLBACK_RESPONSES[0])
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(Arc::new(config))
}

/// Built-in prompts, with any keys present in the file at `path` taking precedence.
pub fn load_prompts<P: AsRef<Path>>(path: Option<P>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) => {
            let file_content = fs::read_to_string(&path)?;
            let config = load_prompts_from_str(&file_content)?;
            info!("Loaded prompt overrides from {}", path.as_ref().display());
            Ok(config)
        }
        None => Ok(Arc::new(PromptConfig::default())),
    }
}
