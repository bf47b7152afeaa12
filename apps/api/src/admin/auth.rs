//! Admin console authentication: argon2 password hashes, random session tokens
//! stored in `admin_sessions`, and the `admin_session` cookie.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::admin::{AdminRole, AdminUserRow};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "admin_session";
const TOKEN_LEN: usize = 48;
pub const MIN_PASSWORD_LEN: usize = 12;

/// The signed-in operator, attached to request extensions by `require_admin`.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentAdmin {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    pub totp_enabled: bool,
    #[serde(skip)]
    pub token: String,
}

impl CurrentAdmin {
    pub fn require_role(&self, role: AdminRole) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash checked for unknown emails, so a login costs one argon2 verification
/// whether or not the account exists.
pub fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("unknown-admin-placeholder").unwrap_or_default())
}

/// Argon2 is deliberately slow; keep it off the async workers.
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

pub fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Value of a named cookie from the `Cookie` request header(s).
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

pub async fn create_session(
    pool: &PgPool,
    admin_id: Uuid,
    ttl_hours: i64,
) -> Result<(String, DateTime<Utc>), sqlx::Error> {
    sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;

    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    sqlx::query("INSERT INTO admin_sessions (token, admin_id, expires_at) VALUES ($1, $2, $3)")
        .bind(&token)
        .bind(admin_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok((token, expires_at))
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM admin_sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// The user behind an unexpired session token.
pub async fn lookup_session(pool: &PgPool, token: &str) -> Result<Option<AdminUserRow>, sqlx::Error> {
    sqlx::query_as::<_, AdminUserRow>(
        r#"
        SELECT u.*
        FROM admin_sessions s
        JOIN admin_users u ON u.id = s.admin_id
        WHERE s.token = $1 AND s.expires_at > now()
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Middleware guarding `/api/admin/*`: requires a valid session cookie and
/// attaches `CurrentAdmin` to the request.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookie_value(req.headers(), SESSION_COOKIE)
        .map(String::from)
        .ok_or(AppError::Unauthorized)?;

    let user = lookup_session(&state.db, &token).await?.ok_or_else(|| {
        debug!("Rejected unknown or expired admin session");
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(CurrentAdmin {
        id: user.id,
        email: user.email.clone(),
        role: user.role(),
        totp_enabled: user.totp_enabled,
        token,
    });

    Ok(next.run(req).await)
}
