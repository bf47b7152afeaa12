use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::AppError;

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    /// Present for v3 tokens only.
    score: Option<f64>,
    action: Option<String>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Server-side reCAPTCHA token check. Without a secret every check passes, so
/// local development works without keys.
#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: Client,
    secret: Option<String>,
    min_score: f64,
    verify_url: String,
}

impl RecaptchaVerifier {
    pub fn new(secret: Option<String>, min_score: f64) -> Result<Self, reqwest::Error> {
        Self::with_verify_url(secret, min_score, RECAPTCHA_VERIFY_URL.to_string())
    }

    pub fn with_verify_url(
        secret: Option<String>,
        min_score: f64,
        verify_url: String,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            secret,
            min_score,
            verify_url,
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            secret: None,
            min_score: 0.0,
            verify_url: RECAPTCHA_VERIFY_URL.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Result<(), AppError> {
        let Some(secret) = self.secret.as_deref() else {
            debug!("reCAPTCHA secret not configured; skipping verification");
            return Ok(());
        };

        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Captcha("missing token".to_string()))?;

        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("reCAPTCHA verification request failed: {e}");
                AppError::Captcha(format!("verification request failed: {e}"))
            })?;

        let result: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Captcha(format!("unreadable verification response: {e}")))?;

        evaluate(&result, self.min_score)
    }
}

fn evaluate(result: &SiteVerifyResponse, min_score: f64) -> Result<(), AppError> {
    if !result.success {
        return Err(AppError::Captcha(format!(
            "token rejected: {}",
            result.error_codes.join(", ")
        )));
    }
    if let Some(score) = result.score {
        if score < min_score {
            return Err(AppError::Captcha(format!(
                "score {score:.2} below threshold {min_score:.2} (action {})",
                result.action.as_deref().unwrap_or("unknown")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn verifier_for(body: serde_json::Value) -> (MockServer, RecaptchaVerifier) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("secret=shh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let verifier = RecaptchaVerifier::with_verify_url(
            Some("shh".to_string()),
            0.5,
            format!("{}/siteverify", server.uri()),
        )
        .unwrap();
        (server, verifier)
    }

    #[tokio::test]
    async fn test_disabled_always_passes() {
        assert!(RecaptchaVerifier::disabled().verify(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let (_server, verifier) = verifier_for(serde_json::json!({"success": true})).await;
        assert!(matches!(
            verifier.verify(Some("  "), None).await,
            Err(AppError::Captcha(_))
        ));
    }

    #[tokio::test]
    async fn test_high_score_passes() {
        let (_server, verifier) =
            verifier_for(serde_json::json!({"success": true, "score": 0.9, "action": "demo"}))
                .await;
        assert!(verifier.verify(Some("tok"), Some("203.0.113.9")).await.is_ok());
    }

    #[tokio::test]
    async fn test_low_score_rejected() {
        let (_server, verifier) =
            verifier_for(serde_json::json!({"success": true, "score": 0.1})).await;
        assert!(verifier.verify(Some("tok"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_unsuccessful_token_rejected() {
        let (_server, verifier) = verifier_for(serde_json::json!({
            "success": false,
            "error-codes": ["timeout-or-duplicate"]
        }))
        .await;
        match verifier.verify(Some("tok"), None).await {
            Err(AppError::Captcha(msg)) => assert!(msg.contains("timeout-or-duplicate")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
