use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use storefront_shared::api::ErrorResponse;

use crate::services::OtpError;

pub enum AppError {
    /// Internal errors - logged but return generic 500 to user
    Internal(anyhow::Error),
    /// User-facing errors - message is safe to show
    External(StatusCode, &'static str),
    /// Validation errors - safe to show
    Validation(String),
    /// Verification code failures
    Otp(OtpError),
}

/// Renders the JSON error envelope shared by every endpoint.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorResponse::new(
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
        message,
    );
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(err) => {
                tracing::error!("internal error: {:?}", err);
                sentry::capture_error(
                    err.as_ref() as &(dyn std::error::Error + Send + Sync + 'static)
                );

                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::External(status, msg) => error_response(status, msg),
            AppError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            AppError::Otp(err) => {
                let (status, msg) = match &err {
                    OtpError::NotFound => (
                        StatusCode::NOT_FOUND,
                        "Verification code expired or does not exist.",
                    ),
                    OtpError::Mismatch => {
                        (StatusCode::BAD_REQUEST, "Verification code does not match.")
                    }
                    OtpError::TooManyAttempts => (
                        StatusCode::TOO_MANY_REQUESTS,
                        "Too many verification attempts. Request a new code later.",
                    ),
                    OtpError::DeliveryFailed(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to send the verification email. Please try again.",
                    ),
                    OtpError::StoreUnavailable(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    }
                };

                if status.is_server_error() {
                    tracing::error!("verification error: {:?}", err);
                    sentry::capture_error(&err);
                }

                error_response(status, msg)
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
