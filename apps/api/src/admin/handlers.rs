//! Axum route handlers for console sign-in, user management and 2FA.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::auth::{
    clear_session_cookie, cookie_value, create_session, delete_session, dummy_hash,
    hash_password_blocking, session_cookie, verify_password_blocking, CurrentAdmin,
    MIN_PASSWORD_LEN, SESSION_COOKIE,
};
use crate::admin::totp;
use crate::admin::users::{create_user, delete_user, find_by_email, find_by_id, list_users, set_totp};
use crate::errors::AppError;
use crate::forms::validation::FormValidator;
use crate::models::admin::{AdminRole, AdminUserRow, AdminUserView};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub totp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: AdminUserView,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: AdminRole,
}

#[derive(Debug, Deserialize)]
pub struct TotpCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TotpSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Session handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/admin/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim();
    let user = find_by_email(&state.db, email).await?;

    // Unknown users and wrong passwords look the same to the caller.
    let Some(user) = user else {
        verify_password_blocking(req.password, dummy_hash().to_string()).await?;
        warn!("Login attempt for unknown admin {email}");
        return Err(AppError::Unauthorized);
    };
    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!("Wrong password for admin {}", user.email);
        return Err(AppError::Unauthorized);
    }

    if user.totp_enabled {
        let code = req
            .totp_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AppError::TotpRequired)?;
        let secret = user
            .totp_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("2FA enabled without a secret")))?;
        if !totp::check_code(secret, &user.email, code)? {
            warn!("Wrong 2FA code for admin {}", user.email);
            return Err(AppError::Unauthorized);
        }
    }

    let ttl_hours = state.config.session_ttl_hours;
    let (token, expires_at) = create_session(&state.db, user.id, ttl_hours).await?;
    let cookie = session_cookie(&token, ttl_hours * 3600, state.config.cookie_secure);

    info!("Admin {} signed in", user.email);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            user: AdminUserView::from(&user),
            expires_at,
        }),
    ))
}

/// POST /api/admin/logout
///
/// Always clears the cookie, even when the session is already gone.
pub async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        delete_session(&state.db, token).await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie(state.config.cookie_secure))],
        Json(SuccessResponse { success: true }),
    ))
}

/// GET /api/admin/me
pub async fn handle_me(Extension(admin): Extension<CurrentAdmin>) -> Json<CurrentAdmin> {
    Json(admin)
}

// ────────────────────────────────────────────────────────────────────────────
// User management (role `admin` only)
// ────────────────────────────────────────────────────────────────────────────

fn validate_new_user(req: &CreateUserRequest) -> Result<String, AppError> {
    let mut v = FormValidator::new();
    let email = v.email("email", Some(&req.email));
    v.check(
        req.password.chars().count() >= MIN_PASSWORD_LEN,
        "password",
        &format!("password must be at least {MIN_PASSWORD_LEN} characters"),
    );
    v.finish()?;
    Ok(email)
}

/// GET /api/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
) -> Result<Json<Vec<AdminUserView>>, AppError> {
    admin.require_role(AdminRole::Admin)?;
    let users = list_users(&state.db).await?;
    Ok(Json(users.iter().map(AdminUserView::from).collect()))
}

/// POST /api/admin/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<AdminUserView>), AppError> {
    admin.require_role(AdminRole::Admin)?;
    let email = validate_new_user(&req)?;

    let hash = hash_password_blocking(req.password).await?;
    let user = create_user(&state.db, &email, &hash, req.role).await?;

    info!("Admin {} created {} user {}", admin.email, req.role.as_str(), user.email);
    Ok((StatusCode::CREATED, Json(AdminUserView::from(&user))))
}

/// DELETE /api/admin/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    admin.require_role(AdminRole::Admin)?;
    if id == admin.id {
        return Err(AppError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }
    if !delete_user(&state.db, id).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    info!("Admin {} deleted user {id}", admin.email);
    Ok(Json(SuccessResponse { success: true }))
}

// ────────────────────────────────────────────────────────────────────────────
// Two-factor authentication
// ────────────────────────────────────────────────────────────────────────────

async fn load_self(state: &AppState, admin: &CurrentAdmin) -> Result<AdminUserRow, AppError> {
    find_by_id(&state.db, admin.id)
        .await?
        .ok_or(AppError::Unauthorized)
}

fn stored_secret(user: &AdminUserRow) -> Result<&str, AppError> {
    user.totp_secret
        .as_deref()
        .ok_or_else(|| AppError::Validation("Run 2FA setup first".to_string()))
}

/// POST /api/admin/2fa/setup
pub async fn handle_totp_setup(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
) -> Result<Json<TotpSetupResponse>, AppError> {
    let user = load_self(&state, &admin).await?;
    if user.totp_enabled {
        return Err(AppError::Conflict("2FA is already enabled".to_string()));
    }

    let secret = totp::generate_secret()?;
    let otpauth_url = totp::provisioning_url(&secret, &user.email)?;
    set_totp(&state.db, user.id, Some(&secret), false).await?;

    Ok(Json(TotpSetupResponse {
        secret,
        otpauth_url,
    }))
}

/// POST /api/admin/2fa/enable
pub async fn handle_totp_enable(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(req): Json<TotpCodeRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = load_self(&state, &admin).await?;
    if user.totp_enabled {
        return Err(AppError::Conflict("2FA is already enabled".to_string()));
    }
    let secret = stored_secret(&user)?;
    if !totp::check_code(secret, &user.email, &req.code)? {
        return Err(AppError::Validation("Invalid 2FA code".to_string()));
    }

    set_totp(&state.db, user.id, Some(secret), true).await?;
    info!("2FA enabled for {}", user.email);
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/admin/2fa/disable
pub async fn handle_totp_disable(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(req): Json<TotpCodeRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = load_self(&state, &admin).await?;
    if !user.totp_enabled {
        return Err(AppError::Conflict("2FA is not enabled".to_string()));
    }
    let secret = stored_secret(&user)?;
    if !totp::check_code(secret, &user.email, &req.code)? {
        return Err(AppError::Validation("Invalid 2FA code".to_string()));
    }

    set_totp(&state.db, user.id, None, false).await?;
    info!("2FA disabled for {}", user.email);
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.to_string(),
            password: password.to_string(),
            role: AdminRole::Agent,
        }
    }

    #[test]
    fn test_new_user_email_is_normalized() {
        let email = validate_new_user(&request(" Agent@Site.Test ", "long-enough-pass")).unwrap();
        assert_eq!(email, "agent@site.test");
    }

    #[test]
    fn test_short_password_is_rejected() {
        let err = validate_new_user(&request("agent@site.test", "short")).unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("password")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_role_deserializes_from_lowercase() {
        let req: CreateUserRequest = serde_json::from_str(
            r#"{"email":"a@site.test","password":"long-enough-pass","role":"admin"}"#,
        )
        .unwrap();
        assert_eq!(req.role, AdminRole::Admin);
        assert!(serde_json::from_str::<CreateUserRequest>(
            r#"{"email":"a@site.test","password":"x","role":"owner"}"#
        )
        .is_err());
    }

    #[test]
    fn test_setup_requires_stored_secret() {
        let row = AdminUserRow {
            id: Uuid::nil(),
            email: "ops@site.test".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            totp_secret: None,
            totp_enabled: false,
            created_at: Utc::now(),
        };
        assert!(matches!(stored_secret(&row), Err(AppError::Validation(_))));
    }
}
