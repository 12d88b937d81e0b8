//! Transactional email.
//!
//! [`SmtpMailer`] delivers over SMTP with STARTTLS; [`LogMailer`] only logs
//! the message and is used when SMTP is not configured.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::{IntegrationError, Mailer, OutgoingEmail};
use crate::config::SmtpConfig;

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// # Errors
    ///
    /// Returns `IntegrationError::Mail` if the relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, IntegrationError> {
        let credentials = Credentials::new(config.username.clone(), config.password.expose_secret().to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| IntegrationError::Mail(e.to_string()))?
            .port(config.port)
            .credentials(credentials)
            .build();
        Ok(Self { transport, from_address: config.from_address.clone() })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), IntegrationError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| IntegrationError::Mail(format!("invalid from address {}", self.from_address)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| IntegrationError::Mail(format!("invalid recipient {}", email.to)))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| IntegrationError::Mail(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| IntegrationError::Mail(e.to_string()))?;
        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Logs outgoing email instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), IntegrationError> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.body, "SMTP not configured, email logged");
        Ok(())
    }
}
