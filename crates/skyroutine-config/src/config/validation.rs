use std::net::SocketAddr;

use skyroutine_utils::error::ConfigError;
use skyroutine_utils::types::{WaitMode, check_driver_token};

use super::Config;

/// Values substituted into driver arguments follow the argument builder's token rule.
fn check_token(errors: &mut Vec<String>, name: &str, value: &str) {
    if let Err(problem) = check_driver_token(value) {
        errors.push(format!("{name} '{value}' {problem}"));
    }
}

impl Config {
    /// Validate configuration values, reporting every problem at once.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.routine.command_timeout_secs == 0 {
            errors.push("command_timeout_secs must be at least 1 second".to_string());
        }
        if self.routine.command_timeout_secs > 3600 {
            errors.push("command_timeout_secs exceeds maximum of 3600 seconds".to_string());
        }
        if self.routine.wait_mode == WaitMode::Poll && self.routine.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be greater than 0 in poll mode".to_string());
        }
        check_token(&mut errors, "platform", &self.routine.platform);

        if self.retrieval.data_endpoint.parse::<SocketAddr>().is_err()
            && !self.retrieval.data_endpoint.contains(':')
        {
            errors.push(format!(
                "data_endpoint '{}' must be host:port",
                self.retrieval.data_endpoint
            ));
        }
        check_token(&mut errors, "query_descriptor", &self.retrieval.query_descriptor);
        if self.retrieval.max_payload_bytes == 0 {
            errors.push("max_payload_bytes must be greater than 0".to_string());
        }
        if self.retrieval.read_timeout_secs == Some(0) {
            errors.push("read_timeout_secs must be greater than 0 when set".to_string());
        }
        if self.retrieval.positives_dir == self.retrieval.negatives_dir {
            errors.push("positives_dir and negatives_dir must differ".to_string());
        }

        for (name, id) in [
            ("services.flight", &self.services.flight),
            ("services.gimbal", &self.services.gimbal),
            ("services.camera", &self.services.camera),
            ("services.trace", &self.services.trace),
        ] {
            check_token(&mut errors, name, id);
        }

        if self.classifier.timeout_secs == 0 {
            errors.push("classifier.timeout_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}
