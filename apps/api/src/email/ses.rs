use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sesv2::config::Credentials;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

use super::{EmailError, EmailMessage, EmailSender};
use crate::config::Config;

const CHARSET: &str = "UTF-8";

/// AWS SES v2 `SendEmail` with simple (subject + body) content.
pub struct SesMailer {
    client: SesClient,
    from: String,
}

impl SesMailer {
    /// Uses static credentials when both keys are configured, otherwise the
    /// default provider chain (instance role, profile, ...).
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws.region.clone()));

        if let (Some(key_id), Some(secret)) = (
            config.aws.access_key_id.as_deref(),
            config.aws.secret_access_key.as_deref(),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "site-api-static",
            ));
        }

        let sdk_config = loader.load().await;
        Self {
            client: SesClient::new(&sdk_config),
            from: config.email_from.clone(),
        }
    }
}

fn content(data: &str) -> Result<Content, EmailError> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| EmailError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl EmailSender for SesMailer {
    fn provider(&self) -> &'static str {
        "ses"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let mut body = Body::builder().text(content(&message.text)?);
        if let Some(html) = &message.html {
            body = body.html(content(html)?);
        }

        let simple = Message::builder()
            .subject(content(&message.subject)?)
            .body(body.build())
            .build();

        let mut request = self
            .client
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .content(EmailContent::builder().simple(simple).build());

        if let Some(reply_to) = &message.reply_to {
            request = request.reply_to_addresses(reply_to);
        }

        let output = request.send().await.map_err(|e| EmailError::Rejected {
            provider: "ses",
            message: DisplayErrorContext(&e).to_string(),
        })?;

        tracing::debug!(
            message_id = output.message_id().unwrap_or_default(),
            "SES accepted message to {}",
            message.to
        );
        Ok(())
    }
}
