use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::chat::handoff::{HandoffEvent, HandoffStatus, TransitionError};
use crate::errors::AppError;
use crate::models::conversation::{
    ChatMessageRow, ConversationRow, ConversationStatus, MessageRole,
};

/// Most recent conversation for a widget session, in any status.
pub async fn latest_conversation(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<ConversationRow>, sqlx::Error> {
    sqlx::query_as::<_, ConversationRow>(
        "SELECT * FROM conversations WHERE session_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_conversation(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ConversationRow>, sqlx::Error> {
    sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// A resolved conversation is never reopened.
fn reusable(latest: Option<ConversationRow>) -> Option<ConversationRow> {
    latest.filter(|c| !c.is_resolved())
}

/// The session's active conversation. A session whose latest conversation was
/// resolved starts a fresh one.
pub async fn find_or_open_conversation(
    pool: &PgPool,
    session_id: &str,
) -> Result<ConversationRow, sqlx::Error> {
    if let Some(existing) = reusable(latest_conversation(pool, session_id).await?) {
        return Ok(existing);
    }

    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        INSERT INTO conversations (id, session_id, status, handoff_status)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(ConversationStatus::Active.as_str())
    .bind(HandoffStatus::None.as_str())
    .fetch_one(pool)
    .await?;

    info!("Opened conversation {} for session {session_id}", row.id);
    Ok(row)
}

/// Appends a message and bumps the conversation's counters in one transaction.
pub async fn append_message(
    pool: &PgPool,
    conversation_id: Uuid,
    role: MessageRole,
    content: &str,
    agent_id: Option<Uuid>,
) -> Result<ChatMessageRow, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let message = insert_message(&mut *tx, conversation_id, role, content, agent_id).await?;
    tx.commit().await?;
    Ok(message)
}

/// Message insert plus counter bump on a caller-owned connection, for callers
/// that need the message inside a larger transaction.
pub async fn insert_message(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    role: MessageRole,
    content: &str,
    agent_id: Option<Uuid>,
) -> Result<ChatMessageRow, sqlx::Error> {
    let message = sqlx::query_as::<_, ChatMessageRow>(
        r#"
        INSERT INTO chat_messages (id, conversation_id, role, content, agent_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(role.as_str())
    .bind(content)
    .bind(agent_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE conversations SET message_count = message_count + 1, updated_at = now() WHERE id = $1",
    )
    .bind(conversation_id)
    .execute(&mut *conn)
    .await?;

    Ok(message)
}

/// Messages of a conversation, oldest first, optionally only those after `after`.
pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
    after: Option<DateTime<Utc>>,
) -> Result<Vec<ChatMessageRow>, sqlx::Error> {
    sqlx::query_as::<_, ChatMessageRow>(
        r#"
        SELECT * FROM chat_messages
        WHERE conversation_id = $1
          AND ($2::timestamptz IS NULL OR created_at > $2)
        ORDER BY created_at ASC
        "#,
    )
    .bind(conversation_id)
    .bind(after)
    .fetch_all(pool)
    .await
}

/// The last `limit` messages, oldest first.
pub async fn recent_messages(
    pool: &PgPool,
    conversation_id: Uuid,
    limit: i64,
) -> Result<Vec<ChatMessageRow>, sqlx::Error> {
    let mut rows = sqlx::query_as::<_, ChatMessageRow>(
        "SELECT * FROM chat_messages WHERE conversation_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

pub async fn list_conversations(
    pool: &PgPool,
    handoff: Option<HandoffStatus>,
    limit: i64,
) -> Result<Vec<ConversationRow>, sqlx::Error> {
    sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT * FROM conversations
        WHERE ($1::text IS NULL OR handoff_status = $1)
        ORDER BY updated_at DESC
        LIMIT $2
        "#,
    )
    .bind(handoff.map(|h| h.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn set_visitor_email<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    email: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE conversations SET visitor_email = $1, updated_at = now() WHERE id = $2")
        .bind(email)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Applies a handoff event and persists the result.
///
/// The write only lands if the row still holds the status the transition was
/// computed from; otherwise the caller gets a 409 and should reload.
pub async fn apply_handoff_event<'e, E: PgExecutor<'e>>(
    executor: E,
    conversation: &ConversationRow,
    event: HandoffEvent,
) -> Result<ConversationRow, AppError> {
    let current = conversation.handoff();
    let next = current.apply(event)?;
    if next == current {
        return Ok(conversation.clone());
    }

    let status = if next == HandoffStatus::Resolved {
        ConversationStatus::Resolved
    } else {
        ConversationStatus::Active
    };

    let updated = sqlx::query_as::<_, ConversationRow>(
        r#"
        UPDATE conversations
        SET handoff_status = $1, status = $2, updated_at = now()
        WHERE id = $3 AND handoff_status = $4
        RETURNING *
        "#,
    )
    .bind(next.as_str())
    .bind(status.as_str())
    .bind(conversation.id)
    .bind(current.as_str())
    .fetch_optional(executor)
    .await?
    .ok_or(TransitionError::Stale {
        expected: current.as_str(),
    })?;

    info!(
        "Conversation {} handoff {} -> {} ({event:?})",
        conversation.id, current, next
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(handoff: HandoffStatus) -> ConversationRow {
        let status = if handoff == HandoffStatus::Resolved {
            ConversationStatus::Resolved
        } else {
            ConversationStatus::Active
        };
        ConversationRow {
            id: Uuid::new_v4(),
            session_id: "sess_1".to_string(),
            status: status.as_str().to_string(),
            handoff_status: handoff.as_str().to_string(),
            message_count: 4,
            visitor_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_conversation_is_reused() {
        for handoff in [
            HandoffStatus::None,
            HandoffStatus::Pending,
            HandoffStatus::InProgress,
        ] {
            let latest = conversation(handoff);
            let id = latest.id;
            assert_eq!(reusable(Some(latest)).map(|c| c.id), Some(id));
        }
    }

    #[test]
    fn test_resolved_conversation_is_not_reused() {
        assert!(reusable(Some(conversation(HandoffStatus::Resolved))).is_none());
        assert!(reusable(None).is_none());
    }
}
