//! Email verification codes.
//!
//! Flow:
//! 1. `send_code` stores a fresh 6-character code under `otp:{email}` for 10
//!    minutes (replacing any earlier one) and emails it
//! 2. `verify_code` compares the submitted code (case-insensitive) with the
//!    stored one in a single atomic step; a match deletes the code and flags
//!    the email as verified for 30 minutes
//!
//! A failed delivery removes the stored code so nothing is left behind.
//! Wrong guesses leave the code in place until it expires, capped per email
//! by the attempt limit.

use std::sync::Arc;

use rand::Rng;

use super::email::{EmailSender, EmailTemplate};
use crate::stores::{ConsumeOutcome, OtpStore, RateLimiter};

/// Lifetime of an issued code.
pub const OTP_TTL_SECS: u64 = 10 * 60;
/// Lifetime of the "recently verified" flag.
pub const VERIFIED_TTL_SECS: u64 = 30 * 60;

const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("verification code expired or does not exist")]
    NotFound,
    #[error("verification code does not match")]
    Mismatch,
    #[error("too many verification attempts")]
    TooManyAttempts,
    #[error("verification email delivery failed: {0:#}")]
    DeliveryFailed(anyhow::Error),
    #[error("verification store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

/// Confirmation of a sent code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSent {
    pub expires_in: u64,
}

/// Draw a code uniformly from `A-Z0-9`.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn attempts_key(email: &str) -> String {
    format!("ratelimit:otp-verify:{}", email)
}

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    limiter: Arc<dyn RateLimiter>,
    email: Arc<dyn EmailSender>,
    /// 0 disables the attempt limit.
    attempt_limit: i64,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        limiter: Arc<dyn RateLimiter>,
        email: Arc<dyn EmailSender>,
        attempt_limit: i64,
    ) -> Self {
        Self {
            store,
            limiter,
            email,
            attempt_limit,
        }
    }

    pub async fn send_code(&self, email: &str) -> Result<CodeSent, OtpError> {
        let code = generate_code();

        self.store
            .store_code(email, &code, OTP_TTL_SECS)
            .await
            .map_err(|e| {
                tracing::error!(op = "store_code", key = %format!("otp:{}", email), "otp store failed: {:?}", e);
                OtpError::StoreUnavailable(e)
            })?;

        let template = EmailTemplate::EmailVerification { otp: code, url: None };
        if let Err(err) = self.email.send(email, &template).await {
            tracing::error!(email = %email, "verification email failed: {:?}", err);

            if let Err(e) = self.store.delete_code(email).await {
                tracing::warn!(op = "delete_code", key = %format!("otp:{}", email), "otp rollback failed: {:?}", e);
            }

            return Err(OtpError::DeliveryFailed(err));
        }

        tracing::info!(email = %email, "verification code sent");

        Ok(CodeSent {
            expires_in: OTP_TTL_SECS,
        })
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), OtpError> {
        let attempts = (self.attempt_limit > 0).then(|| attempts_key(email));

        if let Some(key) = &attempts {
            let failed = self.limiter.current(key).await.map_err(|e| {
                tracing::error!(op = "current", key = %key, "rate limiter failed: {:?}", e);
                OtpError::StoreUnavailable(e)
            })?;

            if failed >= self.attempt_limit {
                tracing::warn!(email = %email, attempts = failed, "verification rate limited");
                return Err(OtpError::TooManyAttempts);
            }
        }

        let normalized = code.to_uppercase();
        let outcome = self
            .store
            .consume_code(email, &normalized, VERIFIED_TTL_SECS)
            .await
            .map_err(|e| {
                tracing::error!(op = "consume_code", key = %format!("otp:{}", email), "otp store failed: {:?}", e);
                OtpError::StoreUnavailable(e)
            })?;

        match outcome {
            ConsumeOutcome::Consumed => {
                if let Some(key) = &attempts
                    && let Err(e) = self.limiter.reset(key).await
                {
                    tracing::warn!(op = "reset", key = %key, "attempt counter reset failed: {:?}", e);
                }
                tracing::info!(email = %email, "email verified");
                Ok(())
            }
            ConsumeOutcome::Missing => {
                tracing::warn!(email = %email, "verification failed: no pending code");
                Err(OtpError::NotFound)
            }
            ConsumeOutcome::Mismatch => {
                // Only wrong guesses count toward the limit
                if let Some(key) = &attempts
                    && let Err(e) = self
                        .limiter
                        .check_simple(key, self.attempt_limit, OTP_TTL_SECS)
                        .await
                {
                    tracing::error!(op = "check_simple", key = %key, "rate limiter failed: {:?}", e);
                }
                tracing::warn!(email = %email, "verification failed: code mismatch");
                Err(OtpError::Mismatch)
            }
        }
    }
}
