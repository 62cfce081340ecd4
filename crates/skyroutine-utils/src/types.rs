//! Shared identifier and policy types used across the skyroutine crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a remote driver service (flight control, gimbal, camera, trace store).
///
/// Driver ids are opaque strings as far as the routine is concerned; the
/// transport resolves them to an endpoint.
///
/// # Example
///
/// ```rust
/// use skyroutine_utils::types::ServiceId;
///
/// let flight = ServiceId::new("org.reroutlab.code.auav.drivers.FlyDroneDriver");
/// assert_eq!(flight.short_name(), "FlyDroneDriver");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last dotted segment of the id, used in log lines.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Checks one key or value of a driver argument string.
///
/// `-` and `=` delimit the encoding; `&`, `?`, `#`, `/` and whitespace would
/// break the request URL. Returns a description of the first problem found.
///
/// ```rust
/// use skyroutine_utils::types::check_driver_token;
///
/// assert!(check_driver_token("AUAVsim").is_ok());
/// assert!(check_driver_token("AUAV sim").is_err());
/// ```
pub fn check_driver_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("must not be empty".to_string());
    }
    match token
        .chars()
        .find(|c| matches!(c, '-' | '=' | '&' | '?' | '#' | '/') || c.is_whitespace())
    {
        Some(bad) => Err(format!("contains reserved character '{bad}'")),
        None => Ok(()),
    }
}

/// Whether the routine enters the bulk retrieval loop after capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStrategy {
    /// Take off, calibrate, capture, land.
    CaptureOnly,
    /// Capture, then pull every indexed image from the trace store and classify it.
    #[default]
    BulkRetrieval,
}

impl RoutineStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CaptureOnly => "capture_only",
            Self::BulkRetrieval => "bulk_retrieval",
        }
    }
}

impl FromStr for RoutineStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture_only" | "capture-only" => Ok(Self::CaptureOnly),
            "bulk_retrieval" | "bulk-retrieval" | "bulk" => Ok(Self::BulkRetrieval),
            other => Err(format!(
                "unknown strategy '{other}' (expected capture_only or bulk_retrieval)"
            )),
        }
    }
}

/// What the orchestrator does after a step fails.
///
/// Landing is issued under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and run the next step.
    #[default]
    Continue,
    /// Skip the remaining mission steps and go straight to landing.
    AbortToLanding,
}

impl FailurePolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::AbortToLanding => "abort_to_landing",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(Self::Continue),
            "abort_to_landing" | "abort-to-landing" | "abort" => Ok(Self::AbortToLanding),
            other => Err(format!(
                "unknown failure policy '{other}' (expected continue or abort_to_landing)"
            )),
        }
    }
}

/// How the controlling sequence waits for a command's completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Block until the completion signal wakes the waiter.
    #[default]
    Notify,
    /// Re-check the latch at a fixed interval.
    Poll,
}

impl FromStr for WaitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify" => Ok(Self::Notify),
            "poll" => Ok(Self::Poll),
            other => Err(format!("unknown wait mode '{other}' (expected notify or poll)")),
        }
    }
}

/// Source of a configuration value, for status display and debugging.
///
/// ```rust
/// use skyroutine_utils::types::ConfigSource;
///
/// let json = serde_json::to_string(&ConfigSource::Cli).unwrap();
/// assert_eq!(json, r#""cli""#);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Built-in default value (lowest precedence).
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Config => write!(f, "config"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_short_name() {
        let id = ServiceId::new("org.reroutlab.code.auav.drivers.DroneGimbalDriver");
        assert_eq!(id.short_name(), "DroneGimbalDriver");

        let bare = ServiceId::new("camera");
        assert_eq!(bare.short_name(), "camera");
    }

    #[test]
    fn test_driver_token_rules() {
        assert!(check_driver_token("mission42").is_ok());
        assert!(check_driver_token("org.reroutlab.code.auav.drivers.FlyDroneDriver").is_ok());
        assert_eq!(check_driver_token("").unwrap_err(), "must not be empty");
        for bad in ["a-b", "a=b", "a b", "a&b", "a?b", "a#b", "a/b", "a\tb"] {
            assert!(check_driver_token(bad).is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(
            check_driver_token("AUAV sim").unwrap_err(),
            "contains reserved character ' '"
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "capture-only".parse::<RoutineStrategy>().unwrap(),
            RoutineStrategy::CaptureOnly
        );
        assert_eq!(
            "bulk".parse::<RoutineStrategy>().unwrap(),
            RoutineStrategy::BulkRetrieval
        );
        assert!("hover".parse::<RoutineStrategy>().is_err());
    }

    #[test]
    fn test_failure_policy_serde() {
        let json = serde_json::to_string(&FailurePolicy::AbortToLanding).unwrap();
        assert_eq!(json, r#""abort_to_landing""#);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Continue);
    }

    #[test]
    fn test_wait_mode_default_is_notify() {
        assert_eq!(WaitMode::default(), WaitMode::Notify);
        assert_eq!("poll".parse::<WaitMode>().unwrap(), WaitMode::Poll);
    }
}
