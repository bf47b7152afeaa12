//! Outbound email: a pluggable `EmailSender` carried in `AppState` as
//! `Arc<dyn EmailSender>`, selected at startup by `EMAIL_PROVIDER`.

pub mod clicksend;
pub mod ses;
pub mod templates;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, EmailProvider};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} rejected the message: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    fn provider(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Email (log provider):\n{}",
            message.text
        );
        Ok(())
    }
}

/// Constructs the sender selected by configuration.
pub async fn build_mailer(config: &Config) -> Result<Arc<dyn EmailSender>> {
    let mailer: Arc<dyn EmailSender> = match config.email_provider {
        EmailProvider::Ses => Arc::new(ses::SesMailer::from_config(config).await),
        EmailProvider::ClickSend => {
            let cs = config
                .clicksend
                .clone()
                .context("ClickSend selected but not configured")?;
            Arc::new(clicksend::ClickSendMailer::new(cs, &config.email_from)?)
        }
        EmailProvider::Log => Arc::new(LogMailer),
    };
    info!("Email provider initialized: {}", mailer.provider());
    Ok(mailer)
}

/// Sends and reports success as a bool. Failures are logged for manual
/// follow-up and never propagated.
pub async fn send_logged(mailer: &dyn EmailSender, message: &EmailMessage, context: &str) -> bool {
    match mailer.send(message).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                provider = mailer.provider(),
                to = %message.to,
                "Email send failed ({context}), needs manual follow-up: {e}"
            );
            false
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records messages instead of sending; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<EmailMessage>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingMailer {
        fn provider(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Rejected {
                    provider: "recording",
                    message: "configured to fail".to_string(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ops@example.com".to_string(),
            to_name: None,
            reply_to: None,
            subject: "Hello".to_string(),
            text: "Body".to_string(),
            html: None,
        }
    }

    #[tokio::test]
    async fn test_send_logged_swallows_failures() {
        let mailer = RecordingMailer::failing();
        assert!(!send_logged(&mailer, &message(), "test").await);
    }

    #[tokio::test]
    async fn test_send_logged_reports_success() {
        let mailer = RecordingMailer::default();
        assert!(send_logged(&mailer, &message(), "test").await);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&message()).await.is_ok());
    }
}
