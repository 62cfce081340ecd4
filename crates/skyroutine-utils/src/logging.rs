//! Logging and observability infrastructure for skyroutine
//!
//! Structured logging via `tracing`. The CLI installs a compact
//! `tracing-subscriber` formatter once at startup; library crates only emit
//! events and spans.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_DIRECTIVES: &str = "skyroutine=info,skyroutine_orchestrator=info,skyroutine_transport=info,warn";
const VERBOSE_DIRECTIVES: &str = "skyroutine=debug,skyroutine_orchestrator=debug,skyroutine_transport=debug,skyroutine_config=debug,info";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise the default filter shows
/// info-level routine events, and `verbose` lowers it to debug and adds
/// targets and span close timings. Events go to stderr so stdout stays
/// clean for `--json` output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new(VERBOSE_DIRECTIVES)
            } else {
                EnvFilter::try_new(DEFAULT_DIRECTIVES)
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Create a span covering one routine step.
pub fn step_span(routine: &str, step: &str) -> tracing::Span {
    span!(Level::INFO, "routine_step", routine = %routine, step = %step)
}

/// Log step start with structured fields
pub fn log_step_start(routine: &str, step: &str, service: &str) {
    info!(
        routine = %routine,
        step = %step,
        service = %service,
        "Starting routine step"
    );
}

/// Log step completion with the driver's response text
pub fn log_step_complete(routine: &str, step: &str, response: &str, duration_ms: u128) {
    info!(
        routine = %routine,
        step = %step,
        duration_ms = %duration_ms,
        response = %response,
        "Routine step completed"
    );
}

/// Log a failed step. The sequence continues unless the failure policy says otherwise.
pub fn log_step_error(routine: &str, step: &str, error: &str, duration_ms: u128) {
    error!(
        routine = %routine,
        step = %step,
        duration_ms = %duration_ms,
        error = %error,
        "Routine step failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
        assert!(EnvFilter::try_new(VERBOSE_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_step_span_has_name() {
        let span = step_span("BasicRoutine", "takeoff");
        // Without a subscriber the span is disabled, but construction must not panic.
        let _guard = span.enter();
    }
}
