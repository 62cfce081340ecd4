//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap:
//! the `Cli` struct with global flags and the `Commands` subcommand enum.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// skyroutine - sequential drone routine over asynchronous driver commands
#[derive(Parser, Debug)]
#[command(name = "skyroutine")]
#[command(about = "Run a drone routine: take off, capture, retrieve and classify images, land")]
#[command(long_about = r#"
skyroutine drives flight, gimbal, camera and trace-store drivers through a fixed
routine, one command at a time. With the bulk retrieval strategy it then pulls every
indexed image from the trace store, classifies it, and files it as positive or
negative. Landing is always issued, even after failures or Ctrl-C.

EXAMPLES:
  # Full routine with the working directory "mission42"
  skyroutine run dp=mission42

  # Capture only, stopping the mission at the first failed step
  skyroutine run dp=mission42 --capture-only --abort-on-failure

  # Print the report as canonical JSON
  skyroutine run dp=mission42 --json

  # Show the effective configuration and where each value came from
  skyroutine config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .skyroutine/config.toml
  Use --config to specify an explicit config file path
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the routine
    #[command(group(ArgGroup::new("strategy").args(["capture_only", "bulk"])))]
    Run {
        /// Startup parameter string; the first field's value names the working directory
        params: String,

        /// Take off, calibrate, capture, land
        #[arg(long)]
        capture_only: bool,

        /// Capture, then retrieve and classify every indexed image
        #[arg(long)]
        bulk: bool,

        /// Skip to landing as soon as a step fails
        #[arg(long)]
        abort_on_failure: bool,

        /// Issue the camera dump command after capture
        #[arg(long)]
        dump_captures: bool,

        /// Per-command timeout in seconds
        #[arg(long, value_name = "SECS")]
        command_timeout: Option<u64>,

        /// Wait mode for command completion (notify or poll)
        #[arg(long, value_name = "MODE")]
        wait_mode: Option<String>,

        /// Trace store data endpoint (host:port)
        #[arg(long, value_name = "ADDR")]
        data_endpoint: Option<String>,

        /// External face detector program
        #[arg(long, value_name = "PROGRAM")]
        classifier: Option<String>,

        /// Output directory for the working image and result sets
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the routine report as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "skyroutine",
            "run",
            "dp=mission42",
            "--capture-only",
            "--abort-on-failure",
            "--command-timeout",
            "12",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                params,
                capture_only,
                abort_on_failure,
                command_timeout,
                ..
            } => {
                assert_eq!(params, "dp=mission42");
                assert!(capture_only);
                assert!(abort_on_failure);
                assert_eq!(command_timeout, Some(12));
            }
            Commands::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_strategy_flags_conflict() {
        assert!(
            Cli::try_parse_from(["skyroutine", "run", "dp=x", "--capture-only", "--bulk"]).is_err()
        );
    }
}
