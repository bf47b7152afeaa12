use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::auth::{hash_password_blocking, MIN_PASSWORD_LEN};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::admin::{AdminRole, AdminUserRow};

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<AdminUserRow>, sqlx::Error> {
    sqlx::query_as::<_, AdminUserRow>("SELECT * FROM admin_users WHERE email = $1")
        .bind(email.to_ascii_lowercase())
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<AdminUserRow>, sqlx::Error> {
    sqlx::query_as::<_, AdminUserRow>("SELECT * FROM admin_users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<AdminUserRow>, sqlx::Error> {
    sqlx::query_as::<_, AdminUserRow>("SELECT * FROM admin_users ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
}

/// Inserts a user. A duplicate email is reported as a conflict.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    role: AdminRole,
) -> Result<AdminUserRow, AppError> {
    let result = sqlx::query_as::<_, AdminUserRow>(
        r#"
        INSERT INTO admin_users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email.to_ascii_lowercase())
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AppError::Conflict(
            format!("A user with email {email} already exists"),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_user(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM admin_users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_totp(
    pool: &PgPool,
    id: Uuid,
    secret: Option<&str>,
    enabled: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE admin_users SET totp_secret = $1, totp_enabled = $2 WHERE id = $3")
        .bind(secret)
        .bind(enabled)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Creates the first `admin` from `ADMIN_EMAIL`/`ADMIN_PASSWORD` when the table
/// holds no admin yet.
pub async fn bootstrap_admin(pool: &PgPool, config: &Config) -> Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("ADMIN_PASSWORD is shorter than {MIN_PASSWORD_LEN} characters; bootstrap admin not created");
        return Ok(());
    }

    let hash = hash_password_blocking(password.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    create_user(pool, email, &hash, AdminRole::Admin)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to create bootstrap admin")?;

    info!("Bootstrap admin {email} created");
    Ok(())
}
