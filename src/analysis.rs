use crate::config::prompt::PromptConfig;
use crate::history::{ format_transcript, ConversationStore, StoreError };
use crate::llm::chat::{ CompletionClient, CompletionRequest };
use crate::locks::KeyedLocks;
use crate::models::chat::{ ChatMessage, Role };
use crate::models::lead::{ parse_lead_response, LeadQuality, LeadRecord };
use crate::webhook::{ WebhookNotifier, WebhookPayload };

use chrono::Utc;
use log::{ info, warn, error };
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

// Vietnamese numbers (0 + 9 or 10 digits) or an international "+<cc> ..." form,
// digits optionally split by spaces, dots or dashes.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b0\d(?:[\s.-]?\d){8,9}|\+[1-9]\d{0,2}(?:[\s.-]?\d){7,12})\b").expect(
        "valid phone regex"
    )
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0?[1-9]|[12]\d|3[01])[./-](?:0?[1-9]|1[0-2])[./-](?:19|20)\d{2}\b").expect(
        "valid date regex"
    )
});

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("conversation '{0}' not found")]
    NotFound(String),
    #[error("conversation '{0}' has no messages to analyze")]
    NoMessages(String),
    #[error("completion API is not configured")]
    CompletionUnavailable,
    #[error("completion request failed: {0}")]
    Completion(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: LeadRecord,
    pub webhook_processed: bool,
    pub webhook_data: Option<JsonValue>,
}

pub fn contains_contact_details(text: &str) -> bool {
    EMAIL_RE.is_match(text) || PHONE_RE.find_iter(text).any(|m| is_phone_number(text, m))
}

/// Rejects matches that are really part of an amount (`1.090.000.000`), a
/// date or a clock time.
fn is_phone_number(text: &str, m: regex::Match<'_>) -> bool {
    let mut before = text[..m.start()].chars().rev();
    if matches!((before.next(), before.next()), (Some('.' | ','), Some(d)) if d.is_ascii_digit()) {
        return false;
    }
    let mut after = text[m.end()..].chars();
    match (after.next(), after.next()) {
        (Some(':'), _) => {
            return false;
        }
        (Some('.' | ','), Some(d)) if d.is_ascii_digit() => {
            return false;
        }
        _ => {}
    }
    !DATE_RE.is_match(m.as_str())
}

/// Turns a conversation into a `LeadRecord` via the extraction model.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn ConversationStore>,
    completion: Option<Arc<dyn CompletionClient>>,
    webhook: Option<Arc<dyn WebhookNotifier>>,
    prompts: Arc<PromptConfig>,
    locks: Arc<KeyedLocks>,
}

impl AnalysisService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        completion: Option<Arc<dyn CompletionClient>>,
        webhook: Option<Arc<dyn WebhookNotifier>>,
        prompts: Arc<PromptConfig>,
        locks: Arc<KeyedLocks>
    ) -> Self {
        Self { store, completion, webhook, prompts, locks }
    }

    pub fn webhook_configured(&self) -> bool {
        self.webhook.is_some()
    }

    pub async fn analyze(&self, id: &str) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(id, false).await
    }

    /// Background variant fired after a chat turn; tagged `autoAnalyzed` in the webhook payload.
    pub async fn auto_analyze(&self, id: &str) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(id, true).await
    }

    async fn run(&self, id: &str, auto: bool) -> Result<AnalysisOutcome, AnalysisError> {
        let record = self.store
            .get(id).await?
            .ok_or_else(|| AnalysisError::NotFound(id.to_string()))?;
        let messages = record.messages;
        if messages.is_empty() {
            return Err(AnalysisError::NoMessages(id.to_string()));
        }
        let client = self.completion.as_ref().ok_or(AnalysisError::CompletionUnavailable)?;

        info!("Analyzing conversation {}", id);
        let transcript = format_transcript(&messages);
        let request = CompletionRequest::new(
            self.prompts.analysis_prompt.clone(),
            vec![ChatMessage::user(transcript.text.clone())]
        );
        let reply = client
            .complete(&request).await
            .map_err(|e| {
                error!("Analysis completion failed for {}: {}", id, e);
                AnalysisError::Completion(e.to_string())
            })?;

        let mut analysis = extract_lead(&reply.response, &messages);
        self.persist(id, analysis.clone()).await?;
        info!("Analysis for {} stored, lead quality: {}", id, analysis.lead_quality);

        let mut webhook_data = None;
        if let Some(webhook) = &self.webhook {
            let payload = WebhookPayload {
                conversation_id: id.to_string(),
                analysis: analysis.clone(),
                transcript: transcript.text,
                timestamp: Utc::now(),
                message_count: messages.len(),
                user_message_count: transcript.user_count,
                assistant_message_count: transcript.assistant_count,
                auto_analyzed: auto,
            };
            webhook_data = webhook.notify(&payload).await;

            if let Some(body) = &webhook_data {
                if analysis.merge_webhook_response(body) {
                    match self.persist(id, analysis.clone()).await {
                        Ok(()) => info!("Updated conversation {} with webhook data", id),
                        Err(e) => warn!("Could not store webhook data for {}: {}", id, e),
                    }
                }
            }
        }

        Ok(AnalysisOutcome {
            analysis,
            webhook_processed: webhook_data.is_some(),
            webhook_data,
        })
    }

    async fn persist(&self, id: &str, analysis: LeadRecord) -> Result<(), StoreError> {
        let _guard = self.locks.lock(id).await;
        self.store.set_analysis(id, analysis).await
    }
}

/// Parses the model reply and applies the contact-detail rule.
///
/// Unparseable output gives the degraded record, which is never upgraded.
/// With an e-mail or phone number in the extracted fields or in any user
/// message the lead is `good`; otherwise the model's own call stands.
pub fn extract_lead(reply: &str, messages: &[ChatMessage]) -> LeadRecord {
    let mut lead = match parse_lead_response(reply) {
        Ok(lead) => lead,
        Err(e) => {
            warn!("Failed to parse analysis JSON: {}", e);
            return LeadRecord::degraded("could not parse response");
        }
    };

    let user_shared_contact = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .any(|m| contains_contact_details(&m.content));

    if lead.has_contact_details() || user_shared_contact {
        lead.lead_quality = LeadQuality::Good;
    }
    lead
}
