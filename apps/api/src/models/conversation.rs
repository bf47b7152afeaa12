use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::chat::handoff::HandoffStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Resolved,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    /// Automated reply from the knowledge base or the LLM.
    #[serde(alias = "bot")]
    Assistant,
    /// Human operator typing in the admin console.
    Agent,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub session_id: String,
    pub status: String,
    pub handoff_status: String,
    pub message_count: i32,
    pub visitor_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    /// Parsed handoff status. Unknown values read as `None` so a bad row never
    /// blocks the widget.
    pub fn handoff(&self) -> HandoffStatus {
        HandoffStatus::parse(&self.handoff_status).unwrap_or(HandoffStatus::None)
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ConversationStatus::Resolved.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
