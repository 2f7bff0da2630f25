pub mod health;
pub mod otp;

use axum::{http::StatusCode, response::IntoResponse};

use crate::error::AppError;

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    AppError::External(StatusCode::NOT_FOUND, "The requested API endpoint does not exist.")
}
