//! Configuration model, discovery, and validation.

mod cli_args;
mod discovery;
mod model;
mod validation;

pub use cli_args::CliArgs;
pub use model::*;
pub use skyroutine_utils::types::ConfigSource;

use std::time::Duration;

impl Config {
    /// Per-command timeout applied by the command invoker.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.routine.command_timeout_secs)
    }

    /// Interval used by the polling wait mode.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.routine.poll_interval_ms)
    }

    /// Endpoint for a driver service: its own entry, else the default endpoint.
    #[must_use]
    pub fn endpoint_for(&self, service: &str) -> &str {
        self.transport
            .endpoints
            .get(service)
            .map_or(self.transport.default_endpoint.as_str(), String::as_str)
    }

    /// Where a setting's effective value came from.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }
}
