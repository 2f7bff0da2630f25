use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Redis URL. When unset, an in-process store is used (development only).
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_redis_connect_timeout_secs")]
    pub redis_connect_timeout_secs: u64,
    /// SMTP URL for development email (e.g., smtp://localhost:1025)
    #[serde(default)]
    pub smtp_url: Option<String>,
    /// Resend API key for production email
    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    /// Set to "production" for JSON logging, "development" to disable rate limiting.
    #[serde(default)]
    pub env: String,
    /// Sentry DSN for error tracking
    #[serde(default)]
    pub sentry_dsn: Option<String>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Wrong-code attempts allowed per email while a code is live. 0 disables the limit.
    #[serde(default = "default_otp_verify_attempt_limit")]
    pub otp_verify_attempt_limit: i64,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: i64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_redis_connect_timeout_secs() -> u64 {
    10
}

fn default_email_from() -> String {
    "Storefront <noreply@storefront.local>".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_otp_verify_attempt_limit() -> i64 {
    10
}

fn default_rate_limit_requests() -> i64 {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}
