//! Application services.
//!
//! ## Services
//!
//! - **email** - Transactional email via Resend (prod) or SMTP (dev), with the
//!   template registry (welcome, password reset, notification, verification)
//! - **otp** - Email verification codes on top of the OTP store and email sender
//!
//! ## Usage in Handlers
//!
//! Services are accessed via `AppState`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let sent = state.otp.send_code(&email).await.map_err(AppError::Otp)?;
//! }
//! ```

mod email;
mod otp;

pub use email::{EmailSender, EmailSenderImpl};
pub use otp::{OtpError, OtpService};

#[cfg(test)]
pub use email::{EmailTemplate, MockEmailSender};
