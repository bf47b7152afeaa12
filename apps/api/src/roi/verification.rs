//! One-time email verification codes gating the full ROI report.
//!
//! Codes are six digits, keyed by lowercased email, live for ten minutes and are
//! consumed on first successful use. Issuing a new code for the same email
//! replaces the old one. Five wrong guesses discard the code.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use redis::AsyncCommands;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const CODE_TTL: Duration = Duration::from_secs(600);
pub const MAX_ATTEMPTS: u32 = 5;
const KEY_PREFIX: &str = "roi:code:";

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("No active verification code for this email; request a new one")]
    NotFound,

    #[error("Verification code has expired; request a new one")]
    Expired,

    #[error("Verification code is incorrect ({remaining} attempts left)")]
    Mismatch { remaining: u32 },

    #[error("Too many incorrect attempts; request a new code")]
    TooManyAttempts,

    #[error("Verification store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for CodeError {
    fn from(e: redis::RedisError) -> Self {
        CodeError::Store(e.to_string())
    }
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Stores `payload` behind a fresh code for `email` and returns the code.
    async fn issue(&self, email: &str, payload: Value) -> Result<String, CodeError>;

    /// Consumes the code and hands back its payload.
    async fn redeem(&self, email: &str, code: &str) -> Result<Value, CodeError>;

    /// Drops any code held for `email`.
    async fn discard(&self, email: &str) -> Result<(), CodeError>;
}

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// A pending code held by the in-process store.
#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    payload: Value,
    attempts: u32,
}

enum Check {
    Accepted(Value),
    Rejected { discard: bool, error: CodeError },
}

impl PendingCode {
    fn new(payload: Value) -> Self {
        Self {
            code: generate_code(),
            payload,
            attempts: 0,
        }
    }

    /// Compares the guess and bumps the attempt counter on a miss.
    fn check(&mut self, guess: &str) -> Check {
        if self.code == guess.trim() {
            return Check::Accepted(self.payload.clone());
        }
        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            Check::Rejected {
                discard: true,
                error: CodeError::TooManyAttempts,
            }
        } else {
            Check::Rejected {
                discard: false,
                error: CodeError::Mismatch {
                    remaining: MAX_ATTEMPTS - self.attempts,
                },
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process store
// ────────────────────────────────────────────────────────────────────────────

/// Default store. Codes are lost on restart and not shared between instances.
#[derive(Default)]
pub struct MemoryCodeStore {
    entries: Mutex<HashMap<String, (PendingCode, Instant)>>,
}

impl MemoryCodeStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (PendingCode, Instant)>>, CodeError> {
        self.entries
            .lock()
            .map_err(|_| CodeError::Store("code map lock poisoned".to_string()))
    }

    fn issue_at(&self, email: &str, payload: Value, now: Instant) -> Result<String, CodeError> {
        let pending = PendingCode::new(payload);
        let code = pending.code.clone();
        let mut entries = self.lock()?;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(normalize(email), (pending, now + CODE_TTL));
        Ok(code)
    }

    fn redeem_at(&self, email: &str, code: &str, now: Instant) -> Result<Value, CodeError> {
        let key = normalize(email);
        let mut entries = self.lock()?;
        let Some((pending, expires)) = entries.get_mut(&key) else {
            return Err(CodeError::NotFound);
        };
        if *expires <= now {
            entries.remove(&key);
            return Err(CodeError::Expired);
        }
        match pending.check(code) {
            Check::Accepted(payload) => {
                entries.remove(&key);
                Ok(payload)
            }
            Check::Rejected { discard, error } => {
                if discard {
                    entries.remove(&key);
                }
                Err(error)
            }
        }
    }
}

#[async_trait]
impl VerificationStore for MemoryCodeStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn issue(&self, email: &str, payload: Value) -> Result<String, CodeError> {
        self.issue_at(email, payload, Instant::now())
    }

    async fn redeem(&self, email: &str, code: &str) -> Result<Value, CodeError> {
        self.redeem_at(email, code, Instant::now())
    }

    async fn discard(&self, email: &str) -> Result<(), CodeError> {
        self.lock()?.remove(&normalize(email));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis store
// ────────────────────────────────────────────────────────────────────────────

/// Compare and consume, or count the miss, in one server-side step so racing
/// requests cannot both redeem a code or reset each other's attempt counter.
/// `HINCRBY` on the existing hash keeps its TTL.
const REDEEM_SCRIPT: &str = r#"
local code = redis.call('HGET', KEYS[1], 'code')
if not code then
  return {'missing'}
end
if code == ARGV[1] then
  local payload = redis.call('HGET', KEYS[1], 'payload')
  redis.call('DEL', KEYS[1])
  return {'accepted', payload}
end
local attempts = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
local max = tonumber(ARGV[2])
if attempts >= max then
  redis.call('DEL', KEYS[1])
  return {'locked'}
end
return {'mismatch', tostring(max - attempts)}
"#;

/// Shared store for multi-instance deployments. Each code is a hash
/// (`code`, `payload`, `attempts`) whose expiry is left to Redis, so an
/// expired code reads as missing.
#[derive(Clone)]
pub struct RedisCodeStore {
    client: redis::Client,
    redeem: redis::Script,
}

impl RedisCodeStore {
    pub fn new(url: &str) -> Result<Self, CodeError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            redeem: redis::Script::new(REDEEM_SCRIPT),
        })
    }

    fn key(email: &str) -> String {
        format!("{KEY_PREFIX}{}", normalize(email))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CodeError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

/// Maps the script's reply onto the store contract.
fn redeem_outcome(reply: &[String]) -> Result<Value, CodeError> {
    match reply {
        [status, payload] if status == "accepted" => {
            serde_json::from_str(payload).map_err(|e| CodeError::Store(e.to_string()))
        }
        [status, remaining] if status == "mismatch" => Err(CodeError::Mismatch {
            remaining: remaining
                .parse()
                .map_err(|_| CodeError::Store(format!("bad attempt count {remaining}")))?,
        }),
        [status] if status == "locked" => Err(CodeError::TooManyAttempts),
        [status] if status == "missing" => Err(CodeError::NotFound),
        other => Err(CodeError::Store(format!("unexpected redeem reply {other:?}"))),
    }
}

#[async_trait]
impl VerificationStore for RedisCodeStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn issue(&self, email: &str, payload: Value) -> Result<String, CodeError> {
        let key = Self::key(email);
        let code = generate_code();
        let payload = serde_json::to_string(&payload).map_err(|e| CodeError::Store(e.to_string()))?;
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(
                &key,
                &[
                    ("code", code.as_str()),
                    ("payload", payload.as_str()),
                    ("attempts", "0"),
                ],
            )
            .ignore()
            .expire(&key, CODE_TTL.as_secs() as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(code)
    }

    async fn redeem(&self, email: &str, code: &str) -> Result<Value, CodeError> {
        let key = Self::key(email);
        let mut conn = self.connection().await?;
        let reply: Vec<String> = self
            .redeem
            .key(&key)
            .arg(code.trim())
            .arg(MAX_ATTEMPTS)
            .invoke_async(&mut conn)
            .await?;
        let outcome = redeem_outcome(&reply);
        if let Err(CodeError::Mismatch { remaining }) = &outcome {
            debug!("Wrong ROI code for {key}, {remaining} attempts left");
        }
        outcome
    }

    async fn discard(&self, email: &str) -> Result<(), CodeError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::key(email)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let store = MemoryCodeStore::default();
        let code = store.issue("CFO@Acme.com", json!({"annual_revenue": 1})).await.unwrap();

        let payload = store.redeem("cfo@acme.com", &code).await.unwrap();
        assert_eq!(payload, json!({"annual_revenue": 1}));
        assert!(matches!(
            store.redeem("cfo@acme.com", &code).await,
            Err(CodeError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_code() {
        let store = MemoryCodeStore::default();
        let first = store.issue("a@acme.com", json!(1)).await.unwrap();
        let mut second = store.issue("a@acme.com", json!(2)).await.unwrap();
        while second == first {
            second = store.issue("a@acme.com", json!(2)).await.unwrap();
        }

        assert!(matches!(
            store.redeem("a@acme.com", &first).await,
            Err(CodeError::Mismatch { remaining: 4 })
        ));
        assert_eq!(store.redeem("a@acme.com", &second).await.unwrap(), json!(2));
    }

    #[test]
    fn test_expired_code_is_rejected_and_purged() {
        let store = MemoryCodeStore::default();
        let start = Instant::now();
        let code = store.issue_at("a@acme.com", json!(null), start).unwrap();

        let later = start + CODE_TTL + Duration::from_secs(1);
        assert!(matches!(
            store.redeem_at("a@acme.com", &code, later),
            Err(CodeError::Expired)
        ));
        assert!(matches!(
            store.redeem_at("a@acme.com", &code, later),
            Err(CodeError::NotFound)
        ));
    }

    #[test]
    fn test_code_discarded_after_max_attempts() {
        let store = MemoryCodeStore::default();
        let now = Instant::now();
        let code = store.issue_at("a@acme.com", json!(null), now).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for remaining in (1..MAX_ATTEMPTS).rev() {
            match store.redeem_at("a@acme.com", wrong, now) {
                Err(CodeError::Mismatch { remaining: r }) => assert_eq!(r, remaining),
                other => panic!("unexpected result {other:?}"),
            }
        }
        assert!(matches!(
            store.redeem_at("a@acme.com", wrong, now),
            Err(CodeError::TooManyAttempts)
        ));
        assert!(matches!(
            store.redeem_at("a@acme.com", &code, now),
            Err(CodeError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_discard_removes_code() {
        let store = MemoryCodeStore::default();
        let code = store.issue("a@acme.com", json!(null)).await.unwrap();
        store.discard("A@acme.com").await.unwrap();
        assert!(matches!(
            store.redeem("a@acme.com", &code).await,
            Err(CodeError::NotFound)
        ));
    }

    fn reply(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_redis_reply_accepted_returns_payload() {
        let payload = redeem_outcome(&reply(&["accepted", r#"{"inputs":{"current_dso":60}}"#])).unwrap();
        assert_eq!(payload["inputs"]["current_dso"], 60);
    }

    #[test]
    fn test_redis_reply_failures_map_to_code_errors() {
        assert!(matches!(
            redeem_outcome(&reply(&["mismatch", "3"])),
            Err(CodeError::Mismatch { remaining: 3 })
        ));
        assert!(matches!(
            redeem_outcome(&reply(&["locked"])),
            Err(CodeError::TooManyAttempts)
        ));
        assert!(matches!(
            redeem_outcome(&reply(&["missing"])),
            Err(CodeError::NotFound)
        ));
        assert!(matches!(
            redeem_outcome(&reply(&["mismatch", "x"])),
            Err(CodeError::Store(_))
        ));
        assert!(matches!(redeem_outcome(&[]), Err(CodeError::Store(_))));
    }

    #[test]
    fn test_redeem_script_is_single_atomic_step() {
        // The whole compare/increment/delete sequence lives in one script, and
        // the miss path never rewrites the key (which would drop its TTL).
        assert!(REDEEM_SCRIPT.contains("HINCRBY"));
        assert!(!REDEEM_SCRIPT.contains("'SET'"));
        assert_eq!(REDEEM_SCRIPT.matches("'DEL'").count(), 2);
    }
}
