//! 17TRACK webhook payload interpretation.
//!
//! Payloads are navigated leniently: any missing level or field of an
//! unexpected JSON type is treated as absent, never as an error.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Event discriminator for tracking updates.
pub const TRACKING_UPDATED: &str = "TRACKING_UPDATED";

/// Top-level webhook envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEnvelope {
    pub event: Value,
    pub data: Value,
}

impl WebhookEnvelope {
    /// Parse a raw body, degrading to an empty envelope on malformed JSON or
    /// a non-object document.
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(other) => {
                debug!(kind = json_kind(&other), "webhook_payload_not_object");
                Self::default()
            }
            Err(e) => {
                debug!(error = %e, "webhook_payload_parse_failed");
                Self::default()
            }
        }
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_str()
    }

    pub fn is_tracking_update(&self) -> bool {
        self.event() == Some(TRACKING_UPDATED)
    }

    /// Extract the latest-status fields from `data`.
    pub fn tracking_update(&self) -> TrackingUpdate {
        let latest_status = self
            .data
            .get("track_info")
            .and_then(|info| info.get("latest_status"))
            .filter(|latest| latest.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        TrackingUpdate {
            number: self.data.get("number").filter(|n| !n.is_null()).cloned(),
            main_status: string_field(&latest_status, "status"),
            sub_status: string_field(&latest_status, "sub_status"),
            latest_status,
        }
    }
}

/// Fields of a `TRACKING_UPDATED` event relevant to alerting.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingUpdate {
    /// Tracking number as sent, usually a string.
    pub number: Option<Value>,
    pub main_status: Option<String>,
    pub sub_status: Option<String>,
    /// The whole `latest_status` object, `{}` when absent.
    pub latest_status: Value,
}

impl TrackingUpdate {
    /// Tracking number as display text, `None` when absent.
    pub fn number_text(&self) -> String {
        display_text(self.number.as_ref())
    }

    /// Main status as sent, including values that are not strings.
    pub fn main_status_text(&self) -> String {
        display_text(self.latest_status.get("status"))
    }

    /// Sub status as sent, including values that are not strings.
    pub fn sub_status_text(&self) -> String {
        display_text(self.latest_status.get("sub_status"))
    }
}

/// Strings verbatim, other values as JSON text, absent or null as `None`.
fn display_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => "None".to_string(),
        Some(other) => other.to_string(),
    }
}

fn string_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
