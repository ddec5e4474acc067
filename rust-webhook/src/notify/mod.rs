//! Alert delivery.
//!
//! Handlers only see the [`Notifier`] trait. Delivery is best-effort: a
//! failed send is reported once to the caller and never retried.

pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::TrackingUpdate;

pub use smtp::SmtpNotifier;

/// Alert delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Invalid notifier settings, raised at construction time.
    #[error("invalid notifier configuration: {0}")]
    Config(String),

    /// Authentication, network or relay failure.
    #[error("alert delivery failed: {0}")]
    Delivery(String),

    /// The session exceeded its time budget.
    #[error("alert delivery timed out after {0}s")]
    Timeout(u64),
}

/// A composed alert, ready to hand to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Build the shipment-issue alert for a tracking update.
    pub fn shipment_issue(update: &TrackingUpdate) -> Self {
        let number = update.number_text();

        let subject = format!("🚨 Shipment issue: {}", number);
        let body = format!(
            "Tracking: {}\nMain status: {}\nSub status: {}\n\nLatest status object:\n{}\n",
            number,
            update.main_status_text(),
            update.sub_status_text(),
            update.latest_status,
        );

        Self::new(subject, body)
    }
}

/// Outbound alert channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs.
    fn channel_type(&self) -> &'static str;

    /// Deliver one alert.
    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError>;
}
