use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::email::{send_logged, templates};
use crate::errors::AppError;
use crate::forms::client_ip;
use crate::forms::store::{insert_submission, list_submissions, update_status};
use crate::forms::validation::{FormValidator, COMPANY_MAX, MESSAGE_MAX, NAME_MAX};
use crate::models::submission::{
    FormSubmitterRow, NewSubmission, SubmissionKind, SubmissionStatus,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub source_page: Option<String>,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub company_size: Option<String>,
    pub annual_revenue: Option<String>,
    pub message: Option<String>,
    pub source_page: Option<String>,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionQuery {
    pub kind: Option<SubmissionKind>,
    pub status: Option<SubmissionStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: SubmissionStatus,
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

/// Inserts trimmed, non-blank optional values into a `form_data` map.
fn put(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::String(v));
    }
}

pub fn validate_contact(req: &ContactRequest) -> Result<NewSubmission, AppError> {
    let mut v = FormValidator::new();
    let first_name = v.required("first_name", req.first_name.as_deref(), NAME_MAX);
    let last_name = v.required("last_name", req.last_name.as_deref(), NAME_MAX);
    let email = v.email("email", req.email.as_deref());
    let company = v.optional("company", req.company.as_deref(), COMPANY_MAX);
    let phone = v.phone("phone", req.phone.as_deref());
    let message = v.required("message", req.message.as_deref(), MESSAGE_MAX);
    let source_page = v.optional("source_page", req.source_page.as_deref(), 500);
    v.finish()?;

    let mut form_data = Map::new();
    form_data.insert("source".to_string(), json!("contact_form"));
    put(&mut form_data, "source_page", source_page);

    Ok(NewSubmission {
        kind: SubmissionKind::Contact,
        first_name,
        last_name,
        email,
        company,
        phone,
        message: Some(message),
        form_data: Value::Object(form_data),
    })
}

pub fn validate_demo(req: &DemoRequest) -> Result<NewSubmission, AppError> {
    let mut v = FormValidator::new();
    let first_name = v.required("first_name", req.first_name.as_deref(), NAME_MAX);
    let last_name = v.required("last_name", req.last_name.as_deref(), NAME_MAX);
    let email = v.business_email("email", req.email.as_deref());
    let company = v.required("company", req.company.as_deref(), COMPANY_MAX);
    let job_title = v.optional("job_title", req.job_title.as_deref(), NAME_MAX);
    let phone = v.phone("phone", req.phone.as_deref());
    let company_size = v.optional("company_size", req.company_size.as_deref(), 50);
    let annual_revenue = v.optional("annual_revenue", req.annual_revenue.as_deref(), 50);
    let message = v.optional("message", req.message.as_deref(), MESSAGE_MAX);
    let source_page = v.optional("source_page", req.source_page.as_deref(), 500);
    v.finish()?;

    let mut form_data = Map::new();
    form_data.insert("source".to_string(), json!("demo_form"));
    put(&mut form_data, "job_title", job_title);
    put(&mut form_data, "company_size", company_size);
    put(&mut form_data, "annual_revenue", annual_revenue);
    put(&mut form_data, "source_page", source_page);

    Ok(NewSubmission {
        kind: SubmissionKind::Demo,
        first_name,
        last_name,
        email,
        company: Some(company),
        phone,
        message,
        form_data: Value::Object(form_data),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Shared pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Notifies sales, confirms to the submitter and stores the row. Email
/// failures are recorded as `notification_sent = false` and never fail the
/// request.
pub async fn record_submission(
    state: &AppState,
    submission: &NewSubmission,
    confirm: bool,
) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    let context = format!("{} {id}", submission.kind.as_str());

    let notification =
        templates::submission_notification(&state.config.sales_notify_email, submission, id);
    let notified = send_logged(state.mailer.as_ref(), &notification, &context).await;

    if confirm {
        let confirmation = templates::submission_confirmation(submission);
        send_logged(state.mailer.as_ref(), &confirmation, &context).await;
    }

    insert_submission(&state.db, id, submission, notified).await?;
    info!(
        "Recorded {} submission {id} (notification_sent={notified})",
        submission.kind.as_str()
    );
    Ok(id)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/contact
pub async fn handle_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContactRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let submission = validate_contact(&req)?;
    state
        .captcha
        .verify(req.recaptcha_token.as_deref(), client_ip(&headers).as_deref())
        .await?;

    let id = record_submission(&state, &submission, true).await?;
    Ok(Json(SubmitResponse {
        success: true,
        message: "Thanks! We'll be in touch shortly.".to_string(),
        id,
    }))
}

/// POST /api/demo
pub async fn handle_demo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DemoRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let submission = validate_demo(&req)?;
    state
        .captcha
        .verify(req.recaptcha_token.as_deref(), client_ip(&headers).as_deref())
        .await?;

    let id = record_submission(&state, &submission, true).await?;
    Ok(Json(SubmitResponse {
        success: true,
        message: "Thanks! Our team will reach out to schedule your demo.".to_string(),
        id,
    }))
}

/// GET /api/admin/submissions
pub async fn handle_list_submissions(
    State(state): State<AppState>,
    Query(params): Query<SubmissionQuery>,
) -> Result<Json<Vec<FormSubmitterRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let rows = list_submissions(&state.db, params.kind, params.status, limit).await?;
    Ok(Json(rows))
}

/// PATCH /api/admin/submissions/:id
pub async fn handle_update_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<FormSubmitterRow>, AppError> {
    let row = update_status(&state.db, id, req.status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))?;
    info!("Submission {id} status set to {}", req.status.as_str());
    Ok(Json(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo(email: &str) -> DemoRequest {
        DemoRequest {
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
            email: Some(email.into()),
            company: Some("Cobol Ltd".into()),
            job_title: Some("Controller".into()),
            phone: None,
            company_size: Some("51-200".into()),
            annual_revenue: None,
            message: None,
            source_page: Some("/pricing".into()),
            recaptcha_token: None,
        }
    }

    #[test]
    fn test_demo_collects_extra_fields_into_form_data() {
        let submission = validate_demo(&demo("grace@cobol.test")).unwrap();
        assert_eq!(submission.kind, SubmissionKind::Demo);
        assert_eq!(submission.form_data["source"], "demo_form");
        assert_eq!(submission.form_data["job_title"], "Controller");
        assert_eq!(submission.form_data["source_page"], "/pricing");
        assert!(submission.form_data.get("annual_revenue").is_none());
    }

    #[test]
    fn test_demo_rejects_free_mail() {
        assert!(matches!(
            validate_demo(&demo("grace@gmail.com")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_contact_requires_message() {
        let req = ContactRequest {
            first_name: Some("Alan".into()),
            last_name: Some("Turing".into()),
            email: Some("alan@gmail.com".into()),
            company: None,
            phone: None,
            message: None,
            source_page: None,
            recaptcha_token: None,
        };
        match validate_contact(&req) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "message is required"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
