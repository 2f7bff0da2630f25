//! Shared test utilities for API handler tests.
//!
//! Provides a flexible `TestStateBuilder` for constructing `AppState`
//! instances with only the mocks needed for each test, or with an in-memory
//! store standing in for Redis.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::TestStateBuilder;
//!
//! let mut otp_store = MockOtpStore::new();
//! otp_store.expect_consume_code().returning(|_, _, _| Ok(ConsumeOutcome::Missing));
//!
//! let state = TestStateBuilder::new()
//!     .with_otp_store(otp_store)
//!     .build();
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::services::{EmailSender, MockEmailSender};
use crate::state::AppState;
use crate::stores::{
    CacheStore, MemoryStore, MockCacheStore, MockOtpStore, MockRateLimiter, OtpStore, RateLimiter,
    StoreConnection, Stores,
};

/// Creates a test configuration with dummy values.
///
/// Verify-attempt limiting is off so tests without a limiter mock can verify
/// freely; tests that exercise it set the limit themselves.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        redis_url: None,
        redis_connect_timeout_secs: 1,
        smtp_url: None,
        resend_api_key: None,
        email_from: "Storefront <noreply@example.com>".to_string(),
        env: "test".to_string(),
        sentry_dsn: None,
        cache_enabled: true,
        cache_ttl_secs: 300,
        otp_verify_attempt_limit: 0,
        rate_limit_requests: 100,
        rate_limit_window_secs: 900,
    }
}

/// Builder for constructing test `AppState` with custom mocks.
///
/// Uses default (empty) mocks for any store/service not explicitly set.
/// This allows tests to only configure the mocks they actually need.
pub struct TestStateBuilder {
    config: Option<Config>,
    memory: Option<Arc<MemoryStore>>,
    connection: Option<Arc<dyn StoreConnection>>,
    otp_store: Option<MockOtpStore>,
    rate_limiter: Option<MockRateLimiter>,
    email_sender: Option<MockEmailSender>,
}

impl TestStateBuilder {
    /// Creates a new builder with no mocks configured.
    pub fn new() -> Self {
        Self {
            config: None,
            memory: None,
            connection: None,
            otp_store: None,
            rate_limiter: None,
            email_sender: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Back every store without an explicit mock by `store`.
    pub fn with_memory_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn with_connection(mut self, connection: Arc<dyn StoreConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_otp_store(mut self, store: MockOtpStore) -> Self {
        self.otp_store = Some(store);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: MockRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_email_sender(mut self, sender: MockEmailSender) -> Self {
        self.email_sender = Some(sender);
        self
    }

    /// Builds the `AppState` using configured mocks or defaults.
    pub fn build(self) -> AppState {
        let memory = self.memory;

        let otp: Arc<dyn OtpStore> = match (self.otp_store, &memory) {
            (Some(mock), _) => Arc::new(mock),
            (None, Some(store)) => store.clone(),
            (None, None) => Arc::new(MockOtpStore::new()),
        };
        let cache: Arc<dyn CacheStore> = match &memory {
            Some(store) => store.clone(),
            None => Arc::new(MockCacheStore::new()),
        };
        let rate_limiter: Arc<dyn RateLimiter> = match (self.rate_limiter, &memory) {
            (Some(mock), _) => Arc::new(mock),
            (None, Some(store)) => store.clone(),
            (None, None) => Arc::new(MockRateLimiter::new()),
        };
        let connection: Arc<dyn StoreConnection> = match (self.connection, &memory) {
            (Some(connection), _) => connection,
            (None, Some(store)) => store.clone(),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let stores = Stores {
            connection,
            otp,
            cache,
            rate_limiter,
        };

        let email = Arc::new(self.email_sender.unwrap_or_else(MockEmailSender::new))
            as Arc<dyn EmailSender>;

        AppState::new(self.config.unwrap_or_else(test_config), stores, email)
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
