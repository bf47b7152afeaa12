use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::submission::{
    FormSubmitterRow, NewSubmission, SubmissionKind, SubmissionStatus,
};

/// Appends a submission with status `new`.
pub async fn insert_submission<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    submission: &NewSubmission,
    notification_sent: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO form_submitters
            (id, kind, first_name, last_name, email, company, phone, message,
             form_data, status, notification_sent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(submission.kind.as_str())
    .bind(&submission.first_name)
    .bind(&submission.last_name)
    .bind(&submission.email)
    .bind(&submission.company)
    .bind(&submission.phone)
    .bind(&submission.message)
    .bind(&submission.form_data)
    .bind(SubmissionStatus::New.as_str())
    .bind(notification_sent)
    .execute(executor)
    .await?;
    Ok(())
}

/// Records that the notification for an already stored submission went out.
pub async fn mark_notification_sent(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE form_submitters SET notification_sent = true, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_submissions(
    pool: &PgPool,
    kind: Option<SubmissionKind>,
    status: Option<SubmissionStatus>,
    limit: i64,
) -> Result<Vec<FormSubmitterRow>, sqlx::Error> {
    sqlx::query_as::<_, FormSubmitterRow>(
        r#"
        SELECT * FROM form_submitters
        WHERE ($1::text IS NULL OR kind = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(kind.map(|k| k.as_str()))
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Manual status edit from the console. Returns `None` when the row is missing.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: SubmissionStatus,
) -> Result<Option<FormSubmitterRow>, sqlx::Error> {
    sqlx::query_as::<_, FormSubmitterRow>(
        "UPDATE form_submitters SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(status.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await
}
