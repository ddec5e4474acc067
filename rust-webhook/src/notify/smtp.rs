//! SMTP alert channel.
//!
//! Each alert opens its own STARTTLS session to the relay: connect in
//! plaintext, EHLO, upgrade to TLS, authenticate, submit, quit.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{AlertMessage, Notifier, NotifyError};
use crate::Config;

/// Sends alerts through an authenticated STARTTLS relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    relay: String,
    timeout: Duration,
}

impl SmtpNotifier {
    /// Build the notifier, validating addresses and relay TLS parameters.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from_email)?;
        let to = config
            .alert_to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = Duration::from_secs(config.smtp_timeout_secs);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Config(format!("relay {}: {}", config.smtp_host, e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            relay: format!("{}:{}", config.smtp_host, config.smtp_port),
            timeout,
        })
    }

    fn build_message(&self, alert: &AlertMessage) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .subject(alert.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body.clone())
            .map_err(|e| NotifyError::Delivery(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn channel_type(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
        let message = self.build_message(alert)?;

        // The transport timeout covers single socket operations; this one
        // bounds the whole session.
        let response = match tokio::time::timeout(self.timeout, self.transport.send(message)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(NotifyError::Delivery(e.to_string())),
            Err(_) => return Err(NotifyError::Timeout(self.timeout.as_secs())),
        };

        info!(
            relay = %self.relay,
            recipients = self.to.len(),
            smtp_code = %response.code(),
            "smtp_message_accepted"
        );

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse()
        .map_err(|e| NotifyError::Config(format!("invalid address {:?}: {}", address, e)))
}
