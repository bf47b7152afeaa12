//! Axum route handlers for the chat widget and the admin chat console.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::auth::CurrentAdmin;
use crate::chat::handoff::{HandoffEvent, HandoffStatus};
use crate::chat::prompts::{HANDOFF_ACK, HUMAN_HANDLED_NOTE};
use crate::chat::store::{
    append_message, apply_handoff_event, find_or_open_conversation, get_conversation,
    insert_message, latest_conversation, list_conversations, list_messages, recent_messages,
    set_visitor_email,
};
use crate::email::{send_logged, templates};
use crate::errors::AppError;
use crate::forms::split_name;
use crate::forms::store::{insert_submission, mark_notification_sent};
use crate::forms::validation::{FormValidator, COMPANY_MAX, MESSAGE_MAX, NAME_MAX};
use crate::llm_client::ChatTurn;
use crate::models::conversation::{ChatMessageRow, ConversationRow, MessageRole};
use crate::models::submission::{NewSubmission, SubmissionKind};
use crate::state::AppState;

const MAX_CHAT_MESSAGE: usize = 2000;
const MAX_SESSION_ID: usize = 128;
const HISTORY_TURNS: i64 = 20;

const HANDOFF_PHRASES: &[&str] = &[
    "human",
    "real person",
    "a person",
    "agent",
    "representative",
    "someone",
    "talk to sales",
    "speak to",
    "speak with",
    "call me",
    "contact sales",
];

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub conversation_id: Uuid,
    pub reply: Option<String>,
    pub handoff_status: HandoffStatus,
    pub suggest_handoff: bool,
}

#[derive(Debug, Deserialize)]
pub struct HandoffRequest {
    pub session_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HandoffResponse {
    pub success: bool,
    pub conversation_id: Uuid,
    pub handoff_status: HandoffStatus,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AfterQuery {
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionMessagesResponse {
    pub conversation_id: Option<Uuid>,
    pub handoff_status: HandoffStatus,
    pub messages: Vec<ChatMessageRow>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub handoff_status: Option<HandoffStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: ConversationRow,
    pub messages: Vec<ChatMessageRow>,
}

#[derive(Debug, Deserialize)]
pub struct AgentReplyRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AgentReplyResponse {
    pub conversation: ConversationRow,
    pub message: ChatMessageRow,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Session ids are generated by the widget: 1-128 chars of `[A-Za-z0-9_-]`.
fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation("session_id is invalid".to_string()))
    }
}

fn validate_message(message: &str) -> Result<&str, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_CHAT_MESSAGE {
        return Err(AppError::Validation(format!(
            "message must be at most {MAX_CHAT_MESSAGE} characters"
        )));
    }
    Ok(message)
}

/// The visitor is asking for a person rather than an answer.
pub fn wants_human(message: &str) -> bool {
    let lower = message.to_lowercase();
    HANDOFF_PHRASES.iter().any(|p| lower.contains(p))
}

fn to_turns(rows: &[ChatMessageRow]) -> Vec<ChatTurn> {
    rows.iter()
        .map(|m| {
            if m.role == MessageRole::User.as_str() {
                ChatTurn::user(m.content.clone())
            } else {
                ChatTurn::assistant(m.content.clone())
            }
        })
        .collect()
}

/// Server transcript wins; the client copy only seeds brand-new conversations.
fn select_history(prior: &[ChatMessageRow], client: &[ChatTurn]) -> Vec<ChatTurn> {
    if prior.is_empty() {
        let skip = client.len().saturating_sub(HISTORY_TURNS as usize);
        client[skip..].to_vec()
    } else {
        to_turns(prior)
    }
}

/// Only the first request notifies sales and files a contact request; repeats
/// just get the holding note.
fn is_new_handoff(before: HandoffStatus) -> bool {
    before == HandoffStatus::None
}

// ────────────────────────────────────────────────────────────────────────────
// Widget handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_session_id(&req.session_id)?;
    let message = validate_message(&req.message)?;

    let conversation = find_or_open_conversation(&state.db, &req.session_id).await?;
    let prior = recent_messages(&state.db, conversation.id, HISTORY_TURNS).await?;
    append_message(&state.db, conversation.id, MessageRole::User, message, None).await?;

    let handoff = conversation.handoff();
    if handoff.is_human_handled() {
        return Ok(Json(ChatResponse {
            success: true,
            conversation_id: conversation.id,
            reply: None,
            handoff_status: handoff,
            suggest_handoff: false,
        }));
    }

    let history = select_history(&prior, &req.history);

    let reply = state.responder.respond(message, &history).await;
    append_message(
        &state.db,
        conversation.id,
        MessageRole::Assistant,
        &reply.text,
        None,
    )
    .await?;

    Ok(Json(ChatResponse {
        success: true,
        conversation_id: conversation.id,
        reply: Some(reply.text),
        handoff_status: handoff,
        suggest_handoff: !reply.grounded || wants_human(message),
    }))
}

/// POST /api/chat/handoff
pub async fn handle_handoff(
    State(state): State<AppState>,
    Json(req): Json<HandoffRequest>,
) -> Result<Json<HandoffResponse>, AppError> {
    validate_session_id(&req.session_id)?;
    let mut v = FormValidator::new();
    let name = v.required("name", req.name.as_deref(), NAME_MAX * 2);
    let email = v.email("email", req.email.as_deref());
    let company = v.optional("company", req.company.as_deref(), COMPANY_MAX);
    let phone = v.phone("phone", req.phone.as_deref());
    let note = v.optional("message", req.message.as_deref(), MESSAGE_MAX);
    v.finish()?;

    let conversation = find_or_open_conversation(&state.db, &req.session_id).await?;
    let before = conversation.handoff();
    if !is_new_handoff(before) {
        return Ok(Json(HandoffResponse {
            success: true,
            conversation_id: conversation.id,
            handoff_status: before,
            message: HUMAN_HANDLED_NOTE.to_string(),
        }));
    }

    let (first_name, last_name) = split_name(&name);
    let submission = NewSubmission {
        kind: SubmissionKind::ChatHandoff,
        first_name,
        last_name,
        email,
        company,
        phone,
        message: note,
        form_data: json!({
            "source": "chat_widget",
            "conversation_id": conversation.id,
            "session_id": req.session_id,
        }),
    };
    let submission_id = Uuid::new_v4();

    // Status change, acknowledgement and contact request land together, so a
    // failed request can be retried instead of leaving a pending handoff with
    // no lead behind it.
    let mut tx = state.db.begin().await?;
    let updated = apply_handoff_event(&mut *tx, &conversation, HandoffEvent::Requested).await?;
    set_visitor_email(&mut *tx, updated.id, &submission.email).await?;
    insert_message(&mut *tx, updated.id, MessageRole::Assistant, HANDOFF_ACK, None).await?;
    insert_submission(&mut *tx, submission_id, &submission, false).await?;
    tx.commit().await?;

    let transcript: Vec<(String, String)> = recent_messages(&state.db, updated.id, 10)
        .await?
        .into_iter()
        .map(|m| (m.role, m.content))
        .collect();

    let notice = templates::HandoffNotice {
        conversation_id: updated.id,
        name: &name,
        email: &submission.email,
        company: submission.company.as_deref(),
        message: submission.message.as_deref(),
        transcript: &transcript,
    };
    let notification = templates::handoff_notification(&state.config.sales_notify_email, &notice);
    let notified = send_logged(
        state.mailer.as_ref(),
        &notification,
        &format!("chat handoff {}", updated.id),
    )
    .await;
    if notified {
        if let Err(e) = mark_notification_sent(&state.db, submission_id).await {
            warn!("Failed to flag notification for submission {submission_id}: {e}");
        }
    }

    info!("Handoff requested for conversation {}", updated.id);
    Ok(Json(HandoffResponse {
        success: true,
        conversation_id: updated.id,
        handoff_status: updated.handoff(),
        message: HANDOFF_ACK.to_string(),
    }))
}

/// GET /api/chat/:session_id/messages
pub async fn handle_session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<AfterQuery>,
) -> Result<Json<SessionMessagesResponse>, AppError> {
    validate_session_id(&session_id)?;

    let Some(conversation) = latest_conversation(&state.db, &session_id).await? else {
        return Ok(Json(SessionMessagesResponse {
            conversation_id: None,
            handoff_status: HandoffStatus::None,
            messages: Vec::new(),
        }));
    };

    let messages = list_messages(&state.db, conversation.id, params.after).await?;
    Ok(Json(SessionMessagesResponse {
        conversation_id: Some(conversation.id),
        handoff_status: conversation.handoff(),
        messages,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Admin console handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/admin/conversations
pub async fn handle_list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ConversationQuery>,
) -> Result<Json<Vec<ConversationRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let rows = list_conversations(&state.db, params.handoff_status, limit).await?;
    Ok(Json(rows))
}

async fn load_conversation(state: &AppState, id: Uuid) -> Result<ConversationRow, AppError> {
    get_conversation(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation {id} not found")))
}

/// GET /api/admin/conversations/:id
pub async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, AppError> {
    let conversation = load_conversation(&state, id).await?;
    let messages = list_messages(&state.db, id, None).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

/// POST /api/admin/conversations/:id/reply
pub async fn handle_agent_reply(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
    Json(req): Json<AgentReplyRequest>,
) -> Result<Json<AgentReplyResponse>, AppError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("content cannot be empty".to_string()));
    }
    if content.chars().count() > MESSAGE_MAX {
        return Err(AppError::Validation(format!(
            "content must be at most {MESSAGE_MAX} characters"
        )));
    }

    let conversation = load_conversation(&state, id).await?;
    let updated = apply_handoff_event(&state.db, &conversation, HandoffEvent::AgentReplied).await?;
    let message =
        append_message(&state.db, id, MessageRole::Agent, content, Some(admin.id)).await?;

    Ok(Json(AgentReplyResponse {
        conversation: updated,
        message,
    }))
}

/// POST /api/admin/conversations/:id/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationRow>, AppError> {
    let conversation = load_conversation(&state, id).await?;
    let updated = apply_handoff_event(&state.db, &conversation, HandoffEvent::Resolve).await?;
    info!("Conversation {id} resolved by {}", admin.email);
    Ok(Json(updated))
}
