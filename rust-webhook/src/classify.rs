//! Shipment status classification.
//!
//! A tracking update is alertable when its main status is a known failure
//! and, under the default policy, its sub status is on a curated allow-list.
//! Rule sets are built once at startup and only read afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::Config;

/// Main statuses that denote a failed shipment.
pub const DEFAULT_BAD_MAIN_STATUSES: &[&str] = &["DeliveryFailure", "Exception"];

/// Failure sub statuses worth waking someone up for.
pub const DEFAULT_BAD_SUB_STATUSES: &[&str] = &[
    "DeliveryFailure_Rejected",
    "DeliveryFailure_InvalidAddress",
    "DeliveryFailure_NoBody",
    "Exception_Returning",
    "Exception_Returned",
    "Exception_Rejected",
    "Exception_Lost",
    "Exception_Cancel",
];

/// Which failure updates raise an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertPolicy {
    /// Bad main status and a sub status from the allow-list.
    #[default]
    SubStatus,
    /// Any bad main status, whatever the sub status.
    AnyFailure,
}

impl AlertPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPolicy::SubStatus => "sub_status",
            AlertPolicy::AnyFailure => "any_failure",
        }
    }
}

impl fmt::Display for AlertPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub_status" => Ok(AlertPolicy::SubStatus),
            "any_failure" => Ok(AlertPolicy::AnyFailure),
            other => Err(format!("unknown alert policy: {other}")),
        }
    }
}

/// Read-only failure rule set.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    bad_main: HashSet<String>,
    bad_sub: HashSet<String>,
    policy: AlertPolicy,
}

impl StatusClassifier {
    pub fn new<M, S>(bad_main: M, bad_sub: S, policy: AlertPolicy) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            bad_main: bad_main.into_iter().map(Into::into).collect(),
            bad_sub: bad_sub.into_iter().map(Into::into).collect(),
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.bad_main_statuses.iter().cloned(),
            config.bad_sub_statuses.iter().cloned(),
            config.alert_policy,
        )
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Decide whether a (main, sub) status pair should raise an alert.
    ///
    /// An absent sub status is treated as the empty string.
    pub fn is_alertable(&self, main_status: Option<&str>, sub_status: Option<&str>) -> bool {
        let Some(main) = main_status else {
            return false;
        };

        if !self.bad_main.contains(main) {
            return false;
        }

        match self.policy {
            AlertPolicy::AnyFailure => true,
            AlertPolicy::SubStatus => self.bad_sub.contains(sub_status.unwrap_or("")),
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_BAD_MAIN_STATUSES.iter().copied(),
            DEFAULT_BAD_SUB_STATUSES.iter().copied(),
            AlertPolicy::SubStatus,
        )
    }
}

/// Classify with the built-in rule set and default policy.
pub fn is_alertable(main_status: Option<&str>, sub_status: Option<&str>) -> bool {
    StatusClassifier::default().is_alertable(main_status, sub_status)
}
