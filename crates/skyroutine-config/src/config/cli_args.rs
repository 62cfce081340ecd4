use std::path::PathBuf;

use skyroutine_utils::types::{FailurePolicy, RoutineStrategy, WaitMode};

/// Command-line overrides fed into configuration discovery.
///
/// Every field is optional; `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit configuration file (skips upward discovery)
    pub config_path: Option<PathBuf>,
    pub strategy: Option<RoutineStrategy>,
    pub failure_policy: Option<FailurePolicy>,
    pub dump_captures: Option<bool>,
    pub command_timeout_secs: Option<u64>,
    pub wait_mode: Option<WaitMode>,
    pub data_endpoint: Option<String>,
    pub classifier_program: Option<String>,
    pub verbose: Option<bool>,
}
