use std::sync::Arc;

use sqlx::PgPool;

use crate::chat::responder::ChatResponder;
use crate::config::Config;
use crate::email::EmailSender;
use crate::forms::recaptcha::RecaptchaVerifier;
use crate::roi::verification::VerificationStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Pluggable email backend: SES, ClickSend or log-only. Chosen by `EMAIL_PROVIDER`.
    pub mailer: Arc<dyn EmailSender>,
    pub captcha: RecaptchaVerifier,
    /// Knowledge-base responder, optionally backed by the LLM.
    pub responder: Arc<dyn ChatResponder>,
    /// ROI verification codes: in-process map, or Redis when `REDIS_URL` is set.
    pub codes: Arc<dyn VerificationStore>,
}

#[cfg(test)]
impl AppState {
    /// State for router tests. The pool never connects, so only requests that
    /// are rejected before touching the database may be exercised.
    pub fn for_tests(mailer: Arc<dyn EmailSender>) -> Self {
        use crate::chat::responder::KeywordResponder;
        use crate::roi::verification::MemoryCodeStore;

        let config = Config::for_tests();
        let db = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .expect("lazy pool never fails to build from a valid url");

        AppState {
            db,
            config,
            mailer,
            captcha: RecaptchaVerifier::disabled(),
            responder: Arc::new(KeywordResponder),
            codes: Arc::new(MemoryCodeStore::default()),
        }
    }
}
