//! Email verification endpoints.
//!
//! - POST /otp/send   `{ email }`       → `{ ok, data: { message, expiresIn }, status }`
//! - POST /otp/verify `{ email, code }` → `{ ok, data: { verified, message }, status }`

use axum::{
    Json, Router, debug_handler,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::post,
};
use garde::Validate;
use storefront_shared::api::{
    ApiSuccess, SendCodePayload, SendCodeResponse, VerifyCodePayload, VerifyCodeResponse,
};

use crate::{error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send", post(send_code))
        .route("/verify", post(verify_code))
}

fn parse<T: Validate<Context = ()>>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(payload)
}

#[debug_handler]
async fn send_code(
    State(state): State<AppState>,
    payload: Result<Json<SendCodePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = parse(payload)?;

    let sent = state
        .otp
        .send_code(&payload.email)
        .await
        .map_err(AppError::Otp)?;

    Ok(Json(ApiSuccess::ok(SendCodeResponse {
        message: "Verification code sent.".to_string(),
        expires_in: sent.expires_in,
    })))
}

#[debug_handler]
async fn verify_code(
    State(state): State<AppState>,
    payload: Result<Json<VerifyCodePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = parse(payload)?;

    state
        .otp
        .verify_code(&payload.email, &payload.code)
        .await
        .map_err(AppError::Otp)?;

    Ok(Json(ApiSuccess::ok(VerifyCodeResponse {
        verified: true,
        message: "Email verification completed.".to_string(),
    })))
}
