//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;
use skyroutine_utils::error::ErrorCategory;
use skyroutine_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;
use crate::{
    CliArgs, Config, ConfigError, ExitCode, FailurePolicy, RoutineError, RoutineStrategy,
    UserFriendlyError, WaitMode,
};

/// Main CLI execution function.
///
/// Handles all output, errors included. `main` only maps `Err(code)` to the
/// process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let cli_args = match build_cli_args(&cli) {
        Ok(args) => args,
        Err(err) => return Err(report_error(&RoutineError::Config(err))),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            return Err(match err.downcast::<ConfigError>() {
                Ok(config_err) => report_error(&RoutineError::Config(config_err)),
                Err(other) => {
                    eprintln!("✗ Failed to load configuration: {other:#}");
                    ExitCode::CLI_ARGS
                }
            });
        }
    };

    install_tracing(config.routine.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                params,
                output_dir,
                json,
                ..
            } => {
                let output_base = match output_dir {
                    Some(dir) => dir,
                    None => match std::env::current_dir() {
                        Ok(dir) => dir,
                        Err(e) => return Err(anyhow::Error::from(RoutineError::from(e))),
                    },
                };
                commands::execute_run_command(&params, &config, &output_base, json).await
            }
            Commands::Config { json } => {
                commands::execute_config_command(&config, json).map(|()| ExitCode::SUCCESS)
            }
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(routine_error) = error.downcast_ref::<RoutineError>() {
                return Err(report_error(routine_error));
            }
            eprintln!("✗ Unexpected error: {error:#}");
            eprintln!("\n  Run with --verbose for more detailed output");
            Err(ExitCode::INTERNAL)
        }
    }
}

/// Install the global subscriber. Returns `false` when one was already set,
/// which keeps the existing subscriber in place.
fn install_tracing(verbose: bool) -> bool {
    match init_tracing(verbose) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Tracing subscriber already installed");
            false
        }
    }
}

/// Map parsed flags onto configuration overrides.
fn build_cli_args(cli: &Cli) -> Result<CliArgs, ConfigError> {
    let mut args = CliArgs {
        config_path: cli.config.clone(),
        verbose: cli.verbose.then_some(true),
        ..CliArgs::default()
    };

    if let Commands::Run {
        capture_only,
        bulk,
        abort_on_failure,
        dump_captures,
        command_timeout,
        wait_mode,
        data_endpoint,
        classifier,
        ..
    } = &cli.command
    {
        args.strategy = if *capture_only {
            Some(RoutineStrategy::CaptureOnly)
        } else if *bulk {
            Some(RoutineStrategy::BulkRetrieval)
        } else {
            None
        };
        args.failure_policy = abort_on_failure.then_some(FailurePolicy::AbortToLanding);
        args.dump_captures = dump_captures.then_some(true);
        args.command_timeout_secs = *command_timeout;
        args.wait_mode = wait_mode
            .as_deref()
            .map(str::parse::<WaitMode>)
            .transpose()
            .map_err(|value| ConfigError::InvalidValue {
                key: "wait_mode".to_string(),
                value,
            })?;
        args.data_endpoint = data_endpoint.clone();
        args.classifier_program = classifier.clone();
    }

    Ok(args)
}

fn report_error(error: &RoutineError) -> ExitCode {
    eprintln!("{}", error.display_for_user());
    if error.category() == ErrorCategory::Configuration {
        eprintln!("  Run 'skyroutine config' to inspect the effective configuration");
    }
    error.to_exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_tracing_install_is_reported() {
        install_tracing(false);
        assert!(!install_tracing(true));
    }

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_run_flags_become_overrides() {
        let cli = parse(&[
            "skyroutine",
            "run",
            "dp=m",
            "--bulk",
            "--abort-on-failure",
            "--wait-mode",
            "poll",
            "--data-endpoint",
            "10.0.0.2:9000",
        ]);
        let args = build_cli_args(&cli).unwrap();

        assert_eq!(args.strategy, Some(RoutineStrategy::BulkRetrieval));
        assert_eq!(args.failure_policy, Some(FailurePolicy::AbortToLanding));
        assert_eq!(args.wait_mode, Some(WaitMode::Poll));
        assert_eq!(args.data_endpoint.as_deref(), Some("10.0.0.2:9000"));
        assert_eq!(args.dump_captures, None);
        assert_eq!(args.verbose, None);
    }

    #[test]
    fn test_bad_wait_mode_is_config_error() {
        let cli = parse(&["skyroutine", "run", "dp=m", "--wait-mode", "spin"]);
        let err = build_cli_args(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "wait_mode"));
    }

    #[test]
    fn test_config_command_has_no_routine_overrides() {
        let cli = parse(&["skyroutine", "config", "--verbose"]);
        let args = build_cli_args(&cli).unwrap();
        assert_eq!(args.strategy, None);
        assert_eq!(args.verbose, Some(true));
    }
}
