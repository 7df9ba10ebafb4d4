pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod locks;
pub mod models;
pub mod server;
pub mod session;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

use analysis::AnalysisService;
use cli::Args;
use config::prompt::load_prompts;
use history::initialize_conversation_store;
use llm::chat::{ new_client, CompletionClient };
use llm::LlmConfig;
use locks::KeyedLocks;
use log::{ info, warn, error };
use server::api::{ chat_rate_limiter, AppState };
use server::Server;
use session::SessionService;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use webhook::{ HttpWebhookNotifier, WebhookNotifier };

fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat API Key: {}", if args.chat_api_key().is_some() { "set" } else { "missing (fallback mode)" });
    info!("Analysis Model: {}", args.analysis_model.as_deref().unwrap_or(&args.chat_model));
    info!("History Store Type: {}", args.history_type);
    if !args.history_type.eq_ignore_ascii_case("memory") {
        info!("History Store Host: {}", args.history_host);
    }
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Webhook URL: {}", args.webhook_url().as_deref().unwrap_or("not configured"));
    info!("Webhook Signing: {}", args.webhook_secret.is_some());
    info!("Auto Analyze: {}", args.auto_analyze);
    info!("Chat Rate Limit: {}/s", args.chat_rate_limit);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");
}

fn log_client(purpose: &str, client: &Option<Arc<dyn CompletionClient>>) {
    if let Some(client) = client {
        info!(
            "{} completions: model {} at {}",
            purpose,
            client.get_model(),
            client.get_base_url().as_deref().unwrap_or("provider default")
        );
    }
}

fn build_webhook(args: &Args) -> Result<Option<Arc<HttpWebhookNotifier>>, Box<dyn Error + Send + Sync>> {
    match args.webhook_url() {
        Some(url) => {
            let notifier = HttpWebhookNotifier::new(
                url,
                args.webhook_secret.clone(),
                Duration::from_secs(args.webhook_timeout_secs)
            )?;
            Ok(Some(Arc::new(notifier)))
        }
        None => Ok(None),
    }
}

async fn test_webhook(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let notifier = build_webhook(args)?.ok_or("--test-webhook requires WEBHOOK_URL")?;
    info!("Sending sample payload to {}", notifier.url());
    match notifier.notify(&webhook::sample_payload()).await {
        Some(body) => {
            info!("Webhook test succeeded, response: {}", body);
            Ok(())
        }
        None => Err("Webhook test failed, see log above".into()),
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log_configuration(&args);

    if args.test_webhook {
        return test_webhook(&args).await;
    }

    let store = initialize_conversation_store(&args)?;
    if !store.ping().await {
        warn!("Conversation store '{}' is not reachable yet", store.backend());
    }

    let prompts = load_prompts(args.prompts_path.as_deref())?;

    let chat_client = new_client(&LlmConfig::for_chat(&args)?)?;
    let analysis_client = new_client(&LlmConfig::for_analysis(&args)?)?;
    log_client("Chat", &chat_client);
    log_client("Analysis", &analysis_client);
    if chat_client.is_none() {
        warn!("No chat API key configured; chat will answer with canned replies");
    }

    let webhook = build_webhook(&args)?.map(|n| n as Arc<dyn WebhookNotifier>);
    if args.auto_analyze && webhook.is_none() {
        warn!("AUTO_ANALYZE is set but WEBHOOK_URL is not; auto-analysis stays off");
    }

    let locks = Arc::new(KeyedLocks::new());
    let session = SessionService::new(
        store.clone(),
        chat_client,
        prompts.clone(),
        locks.clone()
    );
    let analysis = AnalysisService::new(store, analysis_client, webhook, prompts, locks);

    let state = AppState {
        session,
        analysis,
        limiter: chat_rate_limiter(args.chat_rate_limit),
        auto_analyze: args.auto_analyze,
    };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    if let Err(e) = server.run().await {
        error!("Server stopped: {}", e);
        return Err(e);
    }

    Ok(())
}
