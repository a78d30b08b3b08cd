use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Could not build message: {0}")]
    Message(#[from] lettre::error::Error),
}

/// A plain-text lead summary ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadEmail {
    pub subject: String,
    pub body: String,
    /// Contact address for replies, when the lead supplied a valid one.
    pub reply_to: Option<String>,
}

/// Mail transport collaborator. Recipient is fixed by the implementation.
#[async_trait]
pub trait LeadMailer: Send + Sync {
    async fn send(&self, email: &LeadEmail) -> Result<(), NotificationError>;
}

/// SMTP delivery to the configured sales mailbox.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport. No connection is opened until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let builder = if config.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SEND_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from: config.from.parse()?,
            to: config.to.parse()?,
        })
    }
}

#[async_trait]
impl LeadMailer for SmtpMailer {
    async fn send(&self, email: &LeadEmail) -> Result<(), NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        if let Some(ref reply_to) = email.reply_to {
            match reply_to.parse::<Mailbox>() {
                Ok(mailbox) => builder = builder.reply_to(mailbox),
                Err(e) => tracing::warn!("Ignoring reply-to '{}': {}", reply_to, e),
            }
        }

        let message = builder.body(email.body.clone())?;
        self.transport.send(message).await?;

        tracing::info!("✓ Lead email sent to {}", self.to);
        Ok(())
    }
}
