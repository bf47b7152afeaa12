use totp_rs::{Algorithm, Secret, TOTP};

use crate::errors::AppError;

const ISSUER: &str = "Site Admin";
const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

/// A fresh random secret, base32 encoded for storage and authenticator apps.
pub fn generate_secret() -> Result<String, AppError> {
    match Secret::generate_secret().to_encoded() {
        Secret::Encoded(encoded) => Ok(encoded),
        Secret::Raw(_) => Err(AppError::Internal(anyhow::anyhow!(
            "TOTP secret could not be encoded"
        ))),
    }
}

pub fn build(secret_base32: &str, account: &str) -> Result<TOTP, AppError> {
    let bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stored TOTP secret is invalid: {e:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        bytes,
        Some(ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("TOTP setup failed: {e}")))
}

/// `otpauth://` URL rendered as a QR code by the console.
pub fn provisioning_url(secret_base32: &str, account: &str) -> Result<String, AppError> {
    Ok(build(secret_base32, account)?.get_url())
}

/// Accepts the current code or one step either side.
pub fn check_code(secret_base32: &str, account: &str, code: &str) -> Result<bool, AppError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    build(secret_base32, account)?
        .check_current(code)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("system clock error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "ops@site.test";

    #[test]
    fn test_generated_secret_builds() {
        let secret = generate_secret().unwrap();
        assert!(build(&secret, ACCOUNT).is_ok());
    }

    #[test]
    fn test_current_code_is_accepted() {
        let secret = generate_secret().unwrap();
        let code = build(&secret, ACCOUNT).unwrap().generate_current().unwrap();
        assert!(check_code(&secret, ACCOUNT, &code).unwrap());
    }

    #[test]
    fn test_malformed_codes_are_rejected() {
        let secret = generate_secret().unwrap();
        assert!(!check_code(&secret, ACCOUNT, "12345").unwrap());
        assert!(!check_code(&secret, ACCOUNT, "abcdef").unwrap());
    }

    #[test]
    fn test_provisioning_url_names_issuer() {
        let secret = generate_secret().unwrap();
        let url = provisioning_url(&secret, ACCOUNT).unwrap();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer="));
    }
}
