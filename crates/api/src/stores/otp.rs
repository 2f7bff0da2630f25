//! Verification code storage for Redis.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use super::RedisConnection;

/// Key holding the live code for an email.
pub fn otp_key(email: &str) -> String {
    format!("otp:{}", email)
}

/// Key flagging an email as recently verified.
pub fn verified_key(email: &str) -> String {
    format!("otp:verified:{}", email)
}

/// Result of an atomic compare-and-delete on a stored code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Code matched; it was deleted and the verified flag written.
    Consumed,
    /// No live code for this email.
    Missing,
    /// A code exists but differs. It is left in place.
    Mismatch,
}

/// Store for verification codes keyed by email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a code with TTL, replacing any previous code for the email.
    async fn store_code(&self, email: &str, code: &str, ttl_secs: u64) -> Result<()>;

    /// Delete the code for an email.
    async fn delete_code(&self, email: &str) -> Result<()>;

    /// Delete the code only if it equals `code`, then mark the email verified
    /// for `verified_ttl_secs`. Runs as one atomic step.
    async fn consume_code(
        &self,
        email: &str,
        code: &str,
        verified_ttl_secs: u64,
    ) -> Result<ConsumeOutcome>;
}

// KEYS[1] = otp key, KEYS[2] = verified key, ARGV[1] = code, ARGV[2] = verified ttl
const CONSUME_SCRIPT: &str = r"
local stored = redis.call('GET', KEYS[1])
if not stored then
    return 0
end
if stored ~= ARGV[1] then
    return -1
end
redis.call('DEL', KEYS[1])
redis.call('SET', KEYS[2], 'true', 'EX', ARGV[2])
return 1
";

/// Redis implementation of OtpStore.
#[derive(Clone)]
pub struct RedisOtpStore {
    conn: Arc<RedisConnection>,
}

impl RedisOtpStore {
    pub fn new(conn: Arc<RedisConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl OtpStore for RedisOtpStore {
    async fn store_code(&self, email: &str, code: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.get().await?;

        let _: () = conn.set_ex(otp_key(email), code, ttl_secs).await?;
        Ok(())
    }

    async fn delete_code(&self, email: &str) -> Result<()> {
        let mut conn = self.conn.get().await?;

        let _: () = conn.del(otp_key(email)).await?;
        Ok(())
    }

    async fn consume_code(
        &self,
        email: &str,
        code: &str,
        verified_ttl_secs: u64,
    ) -> Result<ConsumeOutcome> {
        let mut conn = self.conn.get().await?;

        let result: i64 = redis::Script::new(CONSUME_SCRIPT)
            .key(otp_key(email))
            .key(verified_key(email))
            .arg(code)
            .arg(verified_ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        Ok(match result {
            1 => ConsumeOutcome::Consumed,
            0 => ConsumeOutcome::Missing,
            _ => ConsumeOutcome::Mismatch,
        })
    }
}
