//! Email sending abstraction.
//!
//! Uses Resend in production, SMTP (lettre) in development.
//! This allows local development without a Resend account.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
};
use resend_rs::types::CreateEmailBaseOptions;

/// Transactional emails the application sends.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    Welcome { password: Option<String> },
    PasswordReset { url: Option<String> },
    Notification,
    EmailVerification { otp: String, url: Option<String> },
}

impl EmailTemplate {
    /// Registry name of the template.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::PasswordReset { .. } => "password-reset",
            Self::Notification => "notification",
            Self::EmailVerification { .. } => "email-verification",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "Welcome to Storefront!",
            Self::PasswordReset { .. } => "Password reset request",
            Self::Notification => "You have a new notification",
            Self::EmailVerification { .. } => "Your email verification code",
        }
    }

    /// Plain-text body.
    pub fn text(&self) -> String {
        match self {
            Self::Welcome { password } => {
                let mut body = "Thanks for joining Storefront.".to_string();
                if let Some(password) = password {
                    body.push_str(&format!(
                        "\n\nYour temporary password is: {}\nPlease change it after signing in.",
                        password
                    ));
                }
                body
            }
            Self::PasswordReset { url } => match url {
                Some(url) => format!(
                    "We received a request to reset your password.\n\nReset it here: {}\n\nIf you did not request this, you can ignore this email.",
                    url
                ),
                None => "We received a request to reset your password.\n\nIf you did not request this, you can ignore this email.".to_string(),
            },
            Self::Notification => "A new notification is waiting for you in Storefront.".to_string(),
            Self::EmailVerification { otp, url } => {
                let mut body = format!(
                    "Your verification code is: {}\n\nThis code expires in 10 minutes.",
                    otp
                );
                if let Some(url) = url {
                    body.push_str(&format!("\n\nOr verify here: {}", url));
                }
                body
            }
        }
    }
}

/// Sends templated emails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver `template` to `to`. An error means the message was not accepted.
    async fn send(&self, to: &str, template: &EmailTemplate) -> Result<()>;
}

/// Configured email backend.
pub enum EmailSenderImpl {
    /// SMTP-based sender using lettre (for development)
    Smtp(SmtpSender),
    /// Resend API sender (for production)
    Resend(ResendSender),
}

impl EmailSenderImpl {
    /// Create a new email sender based on config.
    /// Uses Resend if api key is provided, otherwise falls back to SMTP.
    pub fn new(
        resend_api_key: Option<String>,
        smtp_url: Option<String>,
        from: String,
    ) -> Result<Self> {
        if let Some(api_key) = resend_api_key.filter(|k| !k.is_empty()) {
            Ok(Self::Resend(ResendSender::new(api_key, from)))
        } else if let Some(url) = smtp_url.filter(|u| !u.is_empty()) {
            Ok(Self::Smtp(SmtpSender::new(url, from)?))
        } else {
            anyhow::bail!("Either RESEND_API_KEY or SMTP_URL must be configured")
        }
    }
}

#[async_trait]
impl EmailSender for EmailSenderImpl {
    async fn send(&self, to: &str, template: &EmailTemplate) -> Result<()> {
        match self {
            Self::Resend(sender) => sender.send(to, template).await,
            Self::Smtp(sender) => sender.send(to, template).await,
        }
    }
}

/// SMTP sender using lettre.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(smtp_url: String, from: String) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(&smtp_url)?.build();

        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }

    pub async fn send(&self, to: &str, template: &EmailTemplate) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to.parse()?))
            .subject(template.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(template.text())?;

        self.transport.send(email).await?;

        Ok(())
    }
}

/// Resend API sender.
pub struct ResendSender {
    client: resend_rs::Resend,
    from: String,
}

impl ResendSender {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: resend_rs::Resend::new(&api_key),
            from,
        }
    }

    pub async fn send(&self, to: &str, template: &EmailTemplate) -> Result<()> {
        let email = CreateEmailBaseOptions::new(&self.from, [to], template.subject())
            .with_text(&template.text());

        self.client.emails.send(email).await?;

        Ok(())
    }
}
