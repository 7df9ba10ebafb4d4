use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use hmac::{ Hmac, Mac };
use log::{ info, warn };
use reqwest::header::{ CONTENT_TYPE, USER_AGENT };
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::error::Error;
use std::time::Duration;

use crate::models::lead::LeadRecord;

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_USER_AGENT: &str = "NiO-Chatbot/1.0";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub conversation_id: String,
    pub analysis: LeadRecord,
    pub transcript: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
    pub user_message_count: usize,
    pub assistant_message_count: usize,
    pub auto_analyzed: bool,
}

/// Best-effort delivery of analysis results.
///
/// `notify` never fails: `None` means nothing was delivered, `Some(body)`
/// carries the receiver's reply (`Null` when it was not JSON).
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn notify(&self, payload: &WebhookPayload) -> Option<JsonValue>;
}

pub struct HttpWebhookNotifier {
    http: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl HttpWebhookNotifier {
    pub fn new(
        url: String,
        secret: Option<String>,
        timeout: Duration
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn deliver(&self, payload: &WebhookPayload) -> Result<JsonValue, Box<dyn Error + Send + Sync>> {
        let body = serde_json::to_string(payload)?;
        let mut req = self.http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, WEBHOOK_USER_AGENT);

        if let Some(secret) = &self.secret {
            let ts = Utc::now().timestamp();
            req = req
                .header(TIMESTAMP_HEADER, ts.to_string())
                .header(SIGNATURE_HEADER, format!("sha256={}", sign(secret, ts, &body)?));
        }

        let resp = req.body(body).send().await?.error_for_status()?;
        let status = resp.status();
        let text = resp.text().await?;
        info!("Webhook response received: {}", status);

        Ok(serde_json::from_str(&text).unwrap_or(JsonValue::Null))
    }
}

/// Hex HMAC-SHA256 over `"<ts>.<body>"`.
pub fn sign(secret: &str, ts: i64, body: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| format!("Invalid webhook secret: {}", e))?;
    mac.update(format!("{}.{}", ts, body).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, payload: &WebhookPayload) -> Option<JsonValue> {
        info!("Sending analysis of {} to webhook", payload.conversation_id);
        match self.deliver(payload).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Webhook delivery for {} failed: {}", payload.conversation_id, e);
                None
            }
        }
    }
}

/// Payload used by `--test-webhook`.
pub fn sample_payload() -> WebhookPayload {
    let mut analysis = LeadRecord::degraded("none");
    analysis.customer_name = Some("Test Customer".into());
    analysis.customer_email = Some("test@example.com".into());
    analysis.customer_phone = Some("+1234567890".into());
    analysis.customer_industry = Some("Technology".into());
    analysis.customer_problem = Some("Need chatbot solution".into());
    analysis.customer_availability = Some("Weekdays 9-5".into());
    analysis.customer_consultation = true;
    analysis.special_notes = Some("Test conversation for webhook".into());
    analysis.lead_quality = crate::models::lead::LeadQuality::Good;

    WebhookPayload {
        conversation_id: "test-conversation-123".into(),
        analysis,
        transcript: "User: Hello, I need a chatbot\nAssistant: Hi! I can help you with that.\n".into(),
        timestamp: Utc::now(),
        message_count: 2,
        user_message_count: 1,
        assistant_message_count: 1,
        auto_analyzed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_keyed() {
        let a = sign("secret", 1_700_000_000, "{}").unwrap();
        let b = sign("secret", 1_700_000_000, "{}").unwrap();
        let c = sign("other", 1_700_000_000, "{}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let value = serde_json::to_value(sample_payload()).unwrap();
        assert_eq!(value["conversationId"], "test-conversation-123");
        assert_eq!(value["userMessageCount"], 1);
        assert_eq!(value["autoAnalyzed"], true);
        assert_eq!(value["analysis"]["leadQuality"], "good");
    }

    #[tokio::test]
    async fn unreachable_webhook_yields_none() {
        let notifier = HttpWebhookNotifier::new(
            "http://127.0.0.1:9/hook".into(),
            Some("secret".into()),
            Duration::from_millis(500)
        ).unwrap();
        assert!(notifier.notify(&sample_payload()).await.is_none());
    }
}
