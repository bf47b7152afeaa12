use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Full access, including user management.
    Admin,
    /// Chat console, submissions and analytics only.
    Agent,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Admin => "admin",
            AdminRole::Agent => "agent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(AdminRole::Admin),
            "agent" => Some(AdminRole::Agent),
            _ => None,
        }
    }
}

/// Full row, including credentials. Never serialized to clients.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AdminUserRow {
    pub fn role(&self) -> AdminRole {
        AdminRole::parse(&self.role).unwrap_or(AdminRole::Agent)
    }
}

/// Client-facing projection of an admin user.
#[derive(Debug, Clone, Serialize)]
pub struct AdminUserView {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    pub totp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&AdminUserRow> for AdminUserView {
    fn from(row: &AdminUserRow) -> Self {
        AdminUserView {
            id: row.id,
            email: row.email.clone(),
            role: row.role(),
            totp_enabled: row.totp_enabled,
            created_at: row.created_at,
        }
    }
}
