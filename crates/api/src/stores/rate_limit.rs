//! Rate limiting counters for Redis.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use super::RedisConnection;

/// Rate limiter trait for checking and incrementing counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Increment the counter at `key`, starting a `ttl_secs` window on the
    /// first hit. Exceeded once the count passes `limit`.
    async fn check_simple(&self, key: &str, limit: i64, ttl_secs: u64) -> Result<RateLimitResult>;

    /// Current count at `key` without incrementing (0 when absent).
    async fn current(&self, key: &str) -> Result<i64>;

    /// Drop the counter at `key`.
    async fn reset(&self, key: &str) -> Result<()>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Under the limit, includes current count.
    Allowed(i64),
    /// Over the limit, includes current count.
    Exceeded(i64),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    pub fn count(&self) -> i64 {
        match self {
            RateLimitResult::Allowed(count) | RateLimitResult::Exceeded(count) => *count,
        }
    }

    pub(crate) fn from_count(count: i64, limit: i64) -> Self {
        if count > limit {
            RateLimitResult::Exceeded(count)
        } else {
            RateLimitResult::Allowed(count)
        }
    }
}

/// Redis implementation of RateLimiter.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: Arc<RedisConnection>,
}

impl RedisRateLimiter {
    pub fn new(conn: Arc<RedisConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_simple(&self, key: &str, limit: i64, ttl_secs: u64) -> Result<RateLimitResult> {
        let mut conn = self.conn.get().await?;

        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
        }

        Ok(RateLimitResult::from_count(count, limit))
    }

    async fn current(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.get().await?;

        let count: Option<i64> = conn.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.get().await?;

        let _: () = conn.del(key).await?;
        Ok(())
    }
}
