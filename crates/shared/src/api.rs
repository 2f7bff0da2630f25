//! Shared API request/response types used by the API server and its clients.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Length of an email verification code.
pub const OTP_CODE_LENGTH: usize = 6;

/// Request to send a verification code to an email address.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SendCodePayload {
    #[garde(email)]
    pub email: String,
}

/// Returned once the verification email has been handed off for delivery.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub message: String,
    /// Seconds until the code expires, for a resend countdown.
    pub expires_in: u64,
}

/// Submit the verification code received via email.
///
/// Codes are alphanumeric; lowercase input is accepted and normalized by the server.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VerifyCodePayload {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = OTP_CODE_LENGTH, max = OTP_CODE_LENGTH), pattern(r"^[A-Za-z0-9]+$"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub verified: bool,
    pub message: String,
}

/// Envelope wrapping every successful response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub ok: bool,
    pub data: T,
    pub status: u16,
}

impl<T> ApiSuccess<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data,
            status: 200,
        }
    }
}

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    pub status: u16,
    pub status_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(status: u16, status_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: ErrorDetail {
                message: message.into(),
                status,
                status_text: status_text.into(),
                timestamp: Utc::now(),
            },
        }
    }
}
