use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };

use super::lead::LeadRecord;

const PREVIEW_CHARS: usize = 100;
const NO_MESSAGES_PREVIEW: &str = "No messages";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One chat thread as persisted by a `ConversationStore`.
///
/// `messages` only ever grows; the record is removed as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_analysis: Option<LeadRecord>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            lead_analysis: None,
        }
    }

    /// Messages an end user is allowed to see.
    pub fn display_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> ConversationSummary {
        let leading_system = matches!(self.messages.first(), Some(m) if m.role == Role::System);
        let message_count = self.messages.len() - usize::from(leading_system);

        let preview = self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| preview_of(&m.content))
            .unwrap_or_else(|| NO_MESSAGES_PREVIEW.to_string());

        ConversationSummary {
            id: self.id.clone(),
            preview,
            message_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            analysis: self.lead_analysis.clone(),
        }
    }
}

fn preview_of(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Dashboard listing row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub preview: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analysis: Option<LeadRecord>,
}
