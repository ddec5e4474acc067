//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup. Missing required values are a
//! startup error, never a per-request one.

use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::classify::{AlertPolicy, DEFAULT_BAD_MAIN_STATUSES, DEFAULT_BAD_SUB_STATUSES};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// 17TRACK API key, used as the webhook signing secret
    pub track17_api_key: String,

    /// SMTP relay host
    pub smtp_host: String,

    /// SMTP relay port (STARTTLS submission)
    pub smtp_port: u16,

    /// SMTP username
    pub smtp_user: String,

    /// SMTP password
    pub smtp_pass: String,

    /// Alert recipients
    pub alert_to: Vec<String>,

    /// Sender address for alerts
    pub from_email: String,

    /// Upper bound for one SMTP session, in seconds
    pub smtp_timeout_secs: u64,

    /// Port for the web server to listen on
    pub port: u16,

    /// Which failure updates trigger an alert
    pub alert_policy: AlertPolicy,

    /// Main statuses treated as failures
    pub bad_main_statuses: Vec<String>,

    /// Sub statuses that raise an alert under [`AlertPolicy::SubStatus`]
    pub bad_sub_statuses: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_user = required(&lookup, "SMTP_USER")?;

        let alert_to = parse_csv(&lookup, "ALERT_TO").unwrap_or_default();
        if alert_to.is_empty() {
            return Err(ConfigError::Missing("ALERT_TO"));
        }

        Ok(Config {
            track17_api_key: required(&lookup, "TRACK17_API_KEY")?,

            smtp_host: optional(&lookup, "SMTP_HOST")
                .unwrap_or_else(|| "smtp.office365.com".to_string()),

            smtp_port: parse_or(&lookup, "SMTP_PORT", 587)?,

            smtp_pass: required(&lookup, "SMTP_PASS")?,

            alert_to,

            from_email: optional(&lookup, "FROM_EMAIL").unwrap_or_else(|| smtp_user.clone()),

            smtp_user,

            smtp_timeout_secs: parse_nonzero_or(&lookup, "SMTP_TIMEOUT_SECS", 10)?,

            port: parse_or(&lookup, "PORT", 8080)?,

            alert_policy: parse_or(&lookup, "ALERT_POLICY", AlertPolicy::SubStatus)?,

            bad_main_statuses: status_set(&lookup, "BAD_MAIN_STATUSES", DEFAULT_BAD_MAIN_STATUSES),

            bad_sub_statuses: status_set(&lookup, "BAD_SUB_STATUSES", DEFAULT_BAD_SUB_STATUSES),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Fully populated configuration for unit tests.
    pub(crate) fn for_tests() -> Self {
        Config {
            track17_api_key: "test-api-key".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_user: "alerts@example.com".to_string(),
            smtp_pass: "test-password".to_string(),
            alert_to: vec![
                "ops@example.com".to_string(),
                "shipping@example.com".to_string(),
            ],
            from_email: "alerts@example.com".to_string(),
            smtp_timeout_secs: 2,
            port: 8080,
            alert_policy: AlertPolicy::SubStatus,
            bad_main_statuses: DEFAULT_BAD_MAIN_STATUSES.iter().map(|s| s.to_string()).collect(),
            bad_sub_statuses: DEFAULT_BAD_SUB_STATUSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("track17_api_key", &"<redacted>")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"<redacted>")
            .field("alert_to", &self.alert_to)
            .field("from_email", &self.from_email)
            .field("smtp_timeout_secs", &self.smtp_timeout_secs)
            .field("port", &self.port)
            .field("alert_policy", &self.alert_policy)
            .field("bad_main_statuses", &self.bad_main_statuses)
            .field("bad_sub_statuses", &self.bad_sub_statuses)
            .finish()
    }
}

/// A trimmed, non-empty variable.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Parse a variable, falling back to `default` only when it is unset.
fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Like [`parse_or`], but zero is rejected.
fn parse_nonzero_or<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv<F>(lookup: &F, name: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn status_set<F>(lookup: &F, name: &str, default: &[&str]) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_csv(lookup, name) {
        Some(list) if !list.is_empty() => list,
        Some(_) => {
            warn!(env_var = name, "Empty status list, using default");
            default.iter().map(|s| s.to_string()).collect()
        }
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
