use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Where a `form_submitters` row came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Contact,
    Demo,
    ChatHandoff,
    RoiReport,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Contact => "contact",
            SubmissionKind::Demo => "demo",
            SubmissionKind::ChatHandoff => "chat_handoff",
            SubmissionKind::RoiReport => "roi_report",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionKind::Contact => "Contact form",
            SubmissionKind::Demo => "Demo request",
            SubmissionKind::ChatHandoff => "Chat handoff",
            SubmissionKind::RoiReport => "ROI report",
        }
    }
}

/// Sales follow-up status. Edited manually from the admin console in any order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Archived,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::New => "new",
            SubmissionStatus::Contacted => "contacted",
            SubmissionStatus::Qualified => "qualified",
            SubmissionStatus::Converted => "converted",
            SubmissionStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormSubmitterRow {
    pub id: Uuid,
    pub kind: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub form_data: Value,
    pub status: String,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact fields shared by every submission kind, ready to insert.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub kind: SubmissionKind,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub form_data: Value,
}

impl NewSubmission {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
