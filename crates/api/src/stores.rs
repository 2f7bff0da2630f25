//! Ephemeral stores (Redis).
//!
//! This module contains traits and implementations for ephemeral data storage.
//! All data stored here has automatic TTL-based expiration.
//!
//! ## Stores
//!
//! - **otp** - Email verification codes (10 min TTL) and verified flags (30 min)
//! - **cache** - Cached JSON responses and their tag index
//! - **rate_limit** - Rate limiting counters (verify attempts, per-client requests)
//! - **memory** - In-process backend implementing all of the above
//!
//! The Redis implementations (Lua scripts, pipelines, SCAN) only run against a
//! live server; unit tests cover the same trait contracts through `MemoryStore`.
//!
//! ## Redis Key Patterns
//!
//! ```text
//! otp:{email}                  → Live verification code
//! otp:verified:{email}         → "true" after a successful verification
//! cache:{METHOD}:{path?query}  → CachedResponse JSON
//! tag:{tag}                    → Set of cache keys
//! ratelimit:otp-verify:{email} → Verify attempt count
//! ratelimit:ip:{client}        → Request count per client
//! ```
//!
//! ## Usage in Handlers
//!
//! Stores are accessed via `state.stores`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let healthy = state.stores.connection.ping().await?;
//! }
//! ```

mod cache;
mod connection;
mod memory;
mod otp;
mod rate_limit;

pub use cache::{CacheStore, ClearedKeys, RedisCacheStore};
pub use connection::{RedisConnection, StoreConnection};
pub use memory::MemoryStore;
pub use otp::{ConsumeOutcome, OtpStore, RedisOtpStore};
pub use rate_limit::{RateLimiter, RedisRateLimiter};

#[cfg(test)]
pub use cache::MockCacheStore;
#[cfg(test)]
pub use otp::{MockOtpStore, otp_key, verified_key};
#[cfg(test)]
pub use rate_limit::{MockRateLimiter, RateLimitResult};

use std::sync::Arc;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub connection: Arc<dyn StoreConnection>,
    pub otp: Arc<dyn OtpStore>,
    pub cache: Arc<dyn CacheStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl Stores {
    /// All stores backed by one shared Redis connection.
    pub fn redis(conn: Arc<RedisConnection>) -> Self {
        Self {
            otp: Arc::new(RedisOtpStore::new(conn.clone())),
            cache: Arc::new(RedisCacheStore::new(conn.clone())),
            rate_limiter: Arc::new(RedisRateLimiter::new(conn.clone())),
            connection: conn,
        }
    }

    /// All stores backed by one in-process map.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            otp: store.clone(),
            cache: store.clone(),
            rate_limiter: store.clone(),
            connection: store,
        }
    }
}
