//! Axum route handlers for the ROI calculator.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::errors::AppError;
use crate::forms::handlers::record_submission;
use crate::forms::validation::{FormValidator, COMPANY_MAX, NAME_MAX};
use crate::forms::{client_ip, split_name};
use crate::models::submission::{NewSubmission, SubmissionKind};
use crate::roi::calculator::{RoiInputs, RoiPreview, RoiResults};
use crate::roi::verification::CODE_TTL;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub inputs: RoiInputs,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub success: bool,
    pub preview: RoiPreview,
}

#[derive(Debug, Deserialize)]
pub struct RequestCodeRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub inputs: RoiInputs,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestCodeResponse {
    pub success: bool,
    pub message: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub submission_id: Uuid,
    pub inputs: RoiInputs,
    pub results: RoiResults,
}

/// What travels with a code between request and verification.
#[derive(Debug, Serialize, Deserialize)]
struct PendingReport {
    inputs: RoiInputs,
    name: Option<String>,
    company: Option<String>,
}

fn report_submission(
    email: String,
    pending: PendingReport,
    results: &RoiResults,
) -> NewSubmission {
    let (first_name, last_name) = pending
        .name
        .as_deref()
        .map(split_name)
        .unwrap_or_default();
    NewSubmission {
        kind: SubmissionKind::RoiReport,
        first_name,
        last_name,
        email,
        company: pending.company,
        phone: None,
        message: None,
        form_data: json!({
            "inputs": pending.inputs,
            "results": results,
        }),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/roi/calculate
pub async fn handle_calculate(
    Json(req): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, AppError> {
    req.inputs.validate()?;
    Ok(Json(CalculateResponse {
        success: true,
        preview: req.inputs.preview(),
    }))
}

/// POST /api/roi/request-code
///
/// The visitor cannot continue without the code, so a failed send is an error
/// and the unsent code is dropped.
pub async fn handle_request_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RequestCodeRequest>,
) -> Result<Json<RequestCodeResponse>, AppError> {
    let mut v = FormValidator::new();
    let email = v.email("email", req.email.as_deref());
    let name = v.optional("name", req.name.as_deref(), NAME_MAX * 2);
    let company = v.optional("company", req.company.as_deref(), COMPANY_MAX);
    v.finish()?;
    req.inputs.validate()?;

    state
        .captcha
        .verify(req.recaptcha_token.as_deref(), client_ip(&headers).as_deref())
        .await?;

    let payload = serde_json::to_value(PendingReport {
        inputs: req.inputs,
        name,
        company,
    })
    .map_err(|e| AppError::Internal(e.into()))?;
    let code = state.codes.issue(&email, payload).await?;

    let ttl_minutes = (CODE_TTL.as_secs() / 60) as i64;
    let message = templates::verification_code(&email, &code, ttl_minutes);
    if let Err(e) = state.mailer.send(&message).await {
        warn!("ROI code email to {email} failed: {e}");
        if let Err(discard_err) = state.codes.discard(&email).await {
            warn!("Could not drop unsent ROI code for {email}: {discard_err}");
        }
        return Err(e.into());
    }

    info!("ROI verification code sent via {}", state.mailer.provider());
    Ok(Json(RequestCodeResponse {
        success: true,
        message: format!("We sent a 6-digit code to {email}."),
        expires_in_seconds: CODE_TTL.as_secs(),
    }))
}

/// POST /api/roi/verify
pub async fn handle_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let mut v = FormValidator::new();
    let email = v.email("email", req.email.as_deref());
    let code = v.required("code", req.code.as_deref(), 6);
    v.finish()?;

    let payload: Value = state.codes.redeem(&email, &code).await?;
    let pending: PendingReport = serde_json::from_value(payload)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stored ROI payload is unreadable: {e}")))?;

    let results = pending.inputs.compute();
    let inputs = pending.inputs.clone();
    let submission = report_submission(email, pending, &results);
    let submission_id = record_submission(&state, &submission, false).await?;

    Ok(Json(VerifyResponse {
        success: true,
        submission_id,
        inputs,
        results,
    }))
}
