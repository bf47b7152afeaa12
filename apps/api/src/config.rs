use anyhow::{bail, Context, Result};

/// Which outbound email integration delivers notifications and codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProvider {
    Ses,
    ClickSend,
    /// Development mode: messages are written to the log instead of sent.
    Log,
}

impl EmailProvider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ses" => Ok(Self::Ses),
            "clicksend" => Ok(Self::ClickSend),
            "log" | "" => Ok(Self::Log),
            other => bail!("EMAIL_PROVIDER must be one of ses, clicksend, log (got '{other}')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClickSendConfig {
    pub username: String,
    pub api_key: String,
    pub from_address_id: u64,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub site_origin: Option<String>,
    pub email_provider: EmailProvider,
    pub email_from: String,
    pub sales_notify_email: String,
    pub aws: AwsConfig,
    pub clicksend: Option<ClickSendConfig>,
    pub recaptcha_secret: Option<String>,
    pub recaptcha_min_score: f64,
    pub anthropic_api_key: Option<String>,
    pub llm_model: String,
    pub redis_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let email_provider = EmailProvider::parse(&optional_env("EMAIL_PROVIDER").unwrap_or_default())?;

        let clicksend = if email_provider == EmailProvider::ClickSend {
            Some(ClickSendConfig {
                username: require_env("CLICKSEND_USERNAME")?,
                api_key: require_env("CLICKSEND_API_KEY")?,
                from_address_id: require_env("CLICKSEND_FROM_ADDRESS_ID")?
                    .parse()
                    .context("CLICKSEND_FROM_ADDRESS_ID must be a numeric address id")?,
            })
        } else {
            None
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            site_origin: optional_env("SITE_ORIGIN"),
            email_provider,
            email_from: optional_env("EMAIL_FROM")
                .unwrap_or_else(|| "no-reply@localhost".to_string()),
            sales_notify_email: optional_env("SALES_NOTIFY_EMAIL")
                .unwrap_or_else(|| "sales@localhost".to_string()),
            aws: AwsConfig {
                region: optional_env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
                secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
            },
            clicksend,
            recaptcha_secret: optional_env("RECAPTCHA_SECRET"),
            recaptcha_min_score: parse_env("RECAPTCHA_MIN_SCORE", 0.5)
                .context("RECAPTCHA_MIN_SCORE must be a number between 0 and 1")?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            llm_model: optional_env("LLM_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            redis_url: optional_env("REDIS_URL"),
            admin_email: optional_env("ADMIN_EMAIL"),
            admin_password: optional_env("ADMIN_PASSWORD"),
            session_ttl_hours: parse_env("SESSION_TTL_HOURS", 12)
                .context("SESSION_TTL_HOURS must be a whole number of hours")?,
            cookie_secure: parse_env("COOKIE_SECURE", true)
                .context("COOKIE_SECURE must be true or false")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Returns the variable when it is set to a non-blank value.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => Ok(raw.parse::<T>()?),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by router tests: no external providers configured.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/site_test".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            site_origin: None,
            email_provider: EmailProvider::Log,
            email_from: "no-reply@example.com".to_string(),
            sales_notify_email: "sales@example.com".to_string(),
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                access_key_id: None,
                secret_access_key: None,
            },
            clicksend: None,
            recaptcha_secret: None,
            recaptcha_min_score: 0.5,
            anthropic_api_key: None,
            llm_model: crate::llm_client::DEFAULT_MODEL.to_string(),
            redis_url: None,
            admin_email: None,
            admin_password: None,
            session_ttl_hours: 12,
            cookie_secure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_provider_parse() {
        assert_eq!(EmailProvider::parse("SES").unwrap(), EmailProvider::Ses);
        assert_eq!(EmailProvider::parse("clicksend").unwrap(), EmailProvider::ClickSend);
        assert_eq!(EmailProvider::parse("").unwrap(), EmailProvider::Log);
        assert!(EmailProvider::parse("smtp").is_err());
    }
}
