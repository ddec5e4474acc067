//! 17TRACK alert webhook.
//!
//! Receives signed push notifications from 17TRACK and emails an alert when
//! a shipment reaches a failure state worth acting on.
//!
//! ## Pipeline
//!
//! ```text
//! POST /webhook/17track → verify `sign` → parse payload → classify → email
//! ```

pub mod classify;
pub mod config;
pub mod notify;
pub mod track;
pub mod web;

// Re-export commonly used types
pub use classify::{is_alertable, AlertPolicy, StatusClassifier};
pub use config::{Config, ConfigError};
pub use notify::{AlertMessage, Notifier, NotifyError, SmtpNotifier};
pub use track::{TrackingUpdate, WebhookEnvelope};
pub use web::{build_router, AppState};
