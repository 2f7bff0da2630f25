use std::sync::Arc;

use crate::{
    config::Config,
    services::{EmailSender, OtpService},
    stores::Stores,
};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Ephemeral stores (Redis or in-memory).
    pub stores: Stores,
    /// Email verification codes.
    pub otp: OtpService,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, email: Arc<dyn EmailSender>) -> Self {
        let otp = OtpService::new(
            stores.otp.clone(),
            stores.rate_limiter.clone(),
            email,
            config.otp_verify_attempt_limit,
        );

        Self {
            config,
            stores,
            otp,
        }
    }
}
