use axum::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .port(cfg.port);
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        self.transport.send(message).await?;
        debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// Subject and body for the password-reset email.
pub fn password_reset_email(reset_url: &str) -> (String, String) {
    let subject = "Your password reset token (valid for 10 minutes)".to_string();
    let body = format!(
        "Forgot your password? Submit a PATCH request with your new password to:\n\n\
         {reset_url}\n\n\
         If you didn't request a password reset, you can ignore this email."
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_contains_url() {
        let url = "https://example.com/api/v1/auth/reset-password/abc123";
        let (subject, body) = password_reset_email(url);
        assert!(subject.contains("password reset"));
        assert!(body.contains(url));
    }

    #[tokio::test]
    async fn smtp_mailer_builds_from_config() {
        let cfg = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "mailer".into(),
            password: "secret".into(),
            from: "Authgate <no-reply@authgate.local>".into(),
        };
        assert!(SmtpMailer::new(&cfg).is_ok());
    }
}
