//! mailer.rs
//!
//! Доставка писем (OTP для сброса пароля). `SmtpMailer` отправляет через SMTP,
//! `LogMailer` используется, когда SMTP не настроен.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Пишет письма в лог вместо отправки.
///
/// С `reveal_body` текст письма (и код) попадает в лог: только для development.
#[derive(Debug, Default, Clone)]
pub struct LogMailer {
    reveal_body: bool,
}

impl LogMailer {
    pub fn new(reveal_body: bool) -> Self {
        Self { reveal_body }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if self.reveal_body {
            info!(%to, %subject, %body, "Email not sent (SMTP is not configured)");
        } else {
            warn!(%to, %subject, body_len = body.len(), "Email not sent (SMTP is not configured)");
        }
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::internal(format!("SMTP_FROM {:?}: {e}", config.from)))?;

        // 465 - TLS сразу, иначе STARTTLS
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| AppError::internal(format!("SMTP relay {}: {e}", config.host)))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        info!(host = %config.host, port = config.port, "SMTP mailer configured");
        Ok(Self { transport: builder.build(), from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e| AppError::invalid(format!("Некорректный адрес {to}: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::internal(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::internal(format!("SMTP send failed: {e}")))?;

        info!(%to, %subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(from: &str, port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port,
            username: Some("mailer".into()),
            password: Some("secret".into()),
            from: from.into(),
        }
    }

    #[test]
    fn smtp_mailer_builds_without_connecting() {
        assert!(SmtpMailer::new(&smtp("Ticket Booking <noreply@example.com>", 587)).is_ok());
        assert!(SmtpMailer::new(&smtp("noreply@example.com", 465)).is_ok());
    }

    #[test]
    fn bad_sender_address_is_rejected() {
        let err = SmtpMailer::new(&smtp("not an address", 587)).err().unwrap();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn bad_recipient_is_invalid_argument() {
        let mailer = SmtpMailer::new(&smtp("noreply@example.com", 587)).unwrap();
        let err = mailer.send("nobody", "Password Reset OTP", "123456").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        for reveal_body in [false, true] {
            LogMailer::new(reveal_body)
                .send("a@example.com", "Password Reset OTP", "Your OTP is 123456")
                .await
                .unwrap();
        }
    }
}
