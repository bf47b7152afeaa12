use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmailError, EmailMessage, EmailSender};
use crate::config::ClickSendConfig;

const CLICKSEND_API_URL: &str = "https://rest.clicksend.com";

/// ClickSend transactional email (`POST /v3/email/send`, HTTP basic auth).
pub struct ClickSendMailer {
    client: Client,
    config: ClickSendConfig,
    from_name: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Sender<'a> {
    email_address_id: u64,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: Vec<Recipient<'a>>,
    from: Sender<'a>,
    subject: &'a str,
    body: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    response_code: String,
    #[serde(default)]
    response_msg: String,
}

impl ClickSendMailer {
    pub fn new(config: ClickSendConfig, from: &str) -> Result<Self, EmailError> {
        Self::with_base_url(config, from, CLICKSEND_API_URL)
    }

    pub fn with_base_url(
        config: ClickSendConfig,
        from: &str,
        base_url: &str,
    ) -> Result<Self, EmailError> {
        // ClickSend sends from a verified address id; the configured sender
        // address only contributes the display name.
        let from_name = from.split('@').next().unwrap_or(from).to_string();
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            config,
            from_name,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// ClickSend takes a single HTML body. Plain-text messages are escaped and
/// their line breaks preserved.
fn html_body(message: &EmailMessage) -> String {
    match &message.html {
        Some(html) => html.clone(),
        None => message
            .text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('\n', "<br>\n"),
    }
}

#[async_trait]
impl EmailSender for ClickSendMailer {
    fn provider(&self) -> &'static str {
        "clicksend"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let request = SendRequest {
            to: vec![Recipient {
                email: &message.to,
                name: message.to_name.as_deref(),
            }],
            from: Sender {
                email_address_id: self.config.from_address_id,
                name: &self.from_name,
            },
            subject: &message.subject,
            body: html_body(message),
        };

        let response = self
            .client
            .post(format!("{}/v3/email/send", self.base_url))
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                provider: "clicksend",
                message: format!("status {status}: {body}"),
            });
        }

        let parsed: SendResponse = response.json().await?;
        if parsed.response_code != "SUCCESS" {
            return Err(EmailError::Rejected {
                provider: "clicksend",
                message: format!("{}: {}", parsed.response_code, parsed.response_msg),
            });
        }
        Ok(())
    }
}
