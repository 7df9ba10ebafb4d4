use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- History Store Args ---
    /// Conversation store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// Conversation store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis conversation keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "conversation:")]
    pub history_redis_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.openai.com)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Without it the chat answers with canned replies.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o")]
    pub chat_model: String,

    /// Sampling temperature for chat replies.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Token ceiling for one chat reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "500")]
    pub chat_max_tokens: u32,

    // --- Analysis LLM Args (Optional) ---
    /// Model name for lead extraction. Defaults to CHAT_MODEL if not set.
    #[arg(long, env = "ANALYSIS_MODEL")]
    pub analysis_model: Option<String>,

    /// Sampling temperature for lead extraction. Kept low for stable output.
    #[arg(long, env = "ANALYSIS_TEMPERATURE", default_value = "0.1")]
    pub analysis_temperature: f32,

    /// Token ceiling for one lead extraction.
    #[arg(long, env = "ANALYSIS_MAX_TOKENS", default_value = "1000")]
    pub analysis_max_tokens: u32,

    /// Upper bound in seconds for a single completion call.
    #[arg(long, env = "COMPLETION_TIMEOUT_SECS", default_value = "30")]
    pub completion_timeout_secs: u64,

    // --- Webhook Args ---
    /// URL notified after each lead analysis.
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Optional secret used to sign webhook bodies (HMAC-SHA256).
    #[arg(long, env = "WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,

    /// Upper bound in seconds for a webhook delivery.
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value = "10")]
    pub webhook_timeout_secs: u64,

    /// Analyze the conversation in the background after every chat turn.
    /// Only takes effect when WEBHOOK_URL is set.
    #[arg(long, env = "AUTO_ANALYZE", default_value = "false")]
    pub auto_analyze: bool,

    /// Send a sample payload to WEBHOOK_URL and exit.
    #[arg(long, default_value = "false")]
    pub test_webhook: bool,

    // --- General App Args ---
    /// Path to a JSON file overriding the built-in prompts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:3001")]
    pub server_addr: String,

    /// Chat requests accepted per second across all clients. 0 disables the limit.
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value = "10")]
    pub chat_rate_limit: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// The chat credential, or `None` when it is missing or still the sample placeholder.
    pub fn chat_api_key(&self) -> Option<String> {
        let key = self.chat_api_key.trim();
        if key.is_empty() || key == "your_openai_api_key_here" {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }
}
