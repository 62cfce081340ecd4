use std::fmt;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `RoutineError` is returned by operations that cannot be absorbed by the
/// orchestrator's graceful-degradation rules: bad configuration, bad startup
/// parameters, or failure to set up the run. Failures of individual driver
/// commands are *not* errors at this level; they are recorded in the routine
/// report and the sequence continues.
///
/// # Error Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Params` | Startup parameter string could not be parsed |
/// | `Transport` | Driver command could not be built or delivered |
/// | `Io` | Output base directory could not be resolved |
///
/// Retrieval and classification failures never surface here: the loop records
/// them per payload as [`RetrievalError`] and [`ClassifyError`].
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes.
#[derive(Error, Debug)]
pub enum RoutineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid routine parameters: {0}")]
    Params(#[from] ParamsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Parameters,
    DriverTransport,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Parameters => write!(f, "Parameters"),
            Self::DriverTransport => write!(f, "Driver Transport"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [routine], [services], [transport], [retrieval] and [classifier] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } => Some(
                "skyroutine searches for .skyroutine/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Run 'skyroutine config' to print the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "command_timeout_secs" | "poll_interval_ms" | "read_timeout_secs" => {
                    vec!["Use a positive integer value".to_string()]
                }
                "data_endpoint" => {
                    vec!["Use host:port form, for example 127.0.0.1:44044".to_string()]
                }
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .skyroutine/config.toml in your mission directory".to_string(),
                "Pass --config <path> to use an explicit file".to_string(),
            ],
            Self::ValidationFailed { .. } => {
                vec!["Fix each listed value and run again".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors parsing the delimited startup parameter string
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamsError {
    #[error("parameter string is empty")]
    Empty,

    #[error("field '{field}' is not of the form key=value")]
    MalformedField { field: String },

    #[error("field '{field}' has an empty value")]
    EmptyValue { field: String },
}

/// Errors building or delivering a driver command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("command to {service} could not be dispatched: {reason}")]
    Dispatch { service: String, reason: String },

    #[error("invalid driver argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("command to {service} timed out after {timeout_secs} seconds")]
    Timeout { service: String, timeout_secs: u64 },
}

/// Errors on the bulk data connection or the file sinks
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("could not connect to data endpoint {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read from data endpoint {endpoint} failed: {source}")]
    Read {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read from data endpoint {endpoint} stalled for {timeout_secs} seconds")]
    ReadTimeout { endpoint: String, timeout_secs: u64 },

    #[error("payload exceeded {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("could not write {path}: {reason}")]
    Sink { path: String, reason: String },
}

/// Errors producing a classification decision
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("detector '{program}' could not be started: {reason}")]
    Spawn { program: String, reason: String },

    #[error("detector timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("detector exited with code {code:?}: {stderr_tail}")]
    Detector {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("no classifier program configured")]
    NotConfigured,
}

impl UserFriendlyError for RoutineError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Params(e) => format!("The routine parameter string is invalid: {e}"),
            Self::Transport(e) => format!("A driver command could not be delivered: {e}"),
            Self::Io(e) => format!("File system operation failed: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Params(_) => Some(
                "The first field of the parameter string names the working directory, e.g. 'dp=mission42'."
                    .to_string(),
            ),
            Self::Transport(_) => Some(
                "Driver services must be running and reachable at the endpoints in [transport]."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Params(_) => vec!["Pass parameters as key=value fields joined by '-'".to_string()],
            Self::Transport(_) => vec![
                "Check that the driver services are running".to_string(),
                "Verify [transport] endpoints with 'skyroutine config'".to_string(),
            ],
            Self::Io(_) => vec!["Check permissions on the output directories".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Params(_) => ErrorCategory::Parameters,
            Self::Transport(_) => ErrorCategory::DriverTransport,
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl RoutineError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```rust
    /// use skyroutine_utils::error::{ParamsError, RoutineError};
    ///
    /// let err = RoutineError::Params(ParamsError::Empty);
    /// let message = err.display_for_user();
    /// assert!(message.contains("parameter string"));
    /// assert!(message.contains("Suggestions:"));
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Params(_) => ExitCode::INVALID_PARAMS,
            _ => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_exit_code() {
        let err = RoutineError::Config(ConfigError::InvalidFile("bad".into()));
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_params_error_exit_code() {
        let err: RoutineError = ParamsError::EmptyValue {
            field: "dp=".into(),
        }
        .into();
        assert_eq!(err.to_exit_code(), ExitCode::INVALID_PARAMS);
        assert!(err.to_string().contains("dp="));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout {
            service: "camera".into(),
            timeout_secs: 30,
        };
        assert_eq!(err.to_string(), "command to camera timed out after 30 seconds");
    }

    #[test]
    fn test_io_error_is_internal() {
        let err = RoutineError::from(std::io::Error::other("cwd removed"));
        assert_eq!(err.category(), ErrorCategory::FileSystem);
        assert_eq!(err.to_exit_code(), ExitCode::INTERNAL);
    }

    #[test]
    fn test_display_for_user_includes_context() {
        let err = RoutineError::Transport(TransportError::Dispatch {
            service: "gimbal".into(),
            reason: "connection refused".into(),
        });
        let text = err.display_for_user();
        assert!(text.starts_with("Error: "));
        assert!(text.contains("Context:"));
        assert!(text.contains("[transport]"));
    }
}
