//! CLI command implementations
//!
//! Each `execute_*` function handles one subcommand and prints its own output.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::{
    AbortReason, Classification, Classifier, CommandClassifier, Config, ExitCode, HttpTransport, RetrievalEnd,
    Routine, RoutineDeps, RoutineError, RoutineParams, RoutineReport, RoutineStatus,
    RoutineStrategy, StepStatus, StopHandle, TcpPayloadSource, UnconfiguredClassifier, emit_jcs,
};
use skyroutine_config::ConfigSource;

// ============================================================================
// Run Command
// ============================================================================

/// Run one routine and print its report.
///
/// Returns the report's exit code; step failures are not errors here.
pub async fn execute_run_command(
    params: &str,
    config: &Config,
    output_base: &Path,
    json: bool,
) -> Result<ExitCode> {
    let params = RoutineParams::parse(params).map_err(RoutineError::from)?;
    let deps = build_deps(config)?;

    let stop = StopHandle::new();
    let ctrl_c = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, landing after the current step");
                stop.request_stop();
            }
        })
    };

    let mut routine = Routine::new(config, params, deps, output_base).with_stop_handle(stop);
    let report = routine.run().await;
    ctrl_c.abort();

    if json {
        println!("{}", emit_jcs(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.exit_code())
}

fn build_deps(config: &Config) -> Result<RoutineDeps> {
    let transport = HttpTransport::new_from_config(config).map_err(RoutineError::from)?;
    let classifier: Arc<dyn Classifier> = match CommandClassifier::from_config(&config.classifier)
    {
        Some(classifier) => Arc::new(classifier),
        None => {
            if config.routine.strategy == RoutineStrategy::BulkRetrieval {
                warn!("No [classifier] program configured; retrieved images stay unclassified");
            }
            Arc::new(UnconfiguredClassifier)
        }
    };

    Ok(RoutineDeps {
        transport: Arc::new(transport),
        source: Arc::new(TcpPayloadSource::from_config(&config.retrieval)),
        classifier,
    })
}

fn print_report(report: &RoutineReport) {
    println!("Routine '{}' in {}", report.routine, report.working_dir);
    for record in &report.steps {
        let mark = if record.status == StepStatus::Succeeded {
            "✓"
        } else {
            "✗"
        };
        println!(
            "  {mark} {:<16} {:<24} {} ({}ms)",
            record.step.to_string(),
            record.service.short_name(),
            record.response,
            record.duration_ms
        );
    }

    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(|step| step.as_str()).collect();
        println!("  Skipped: {}", skipped.join(", "));
    }

    if let Some(capture) = &report.capture {
        match &capture.classification {
            Classification::Positive => println!("Captured image contains a face"),
            Classification::Negative => println!("Captured image has no face"),
            Classification::Unclassified { reason } => {
                println!("Captured image left unclassified: {reason}");
            }
        }
    }

    if let Some(summary) = &report.retrieval {
        println!(
            "Retrieved {} images: {} positive, {} negative, {} unclassified",
            summary.images.len(),
            summary.positives,
            summary.negatives,
            summary.unclassified
        );
        match &summary.end {
            RetrievalEnd::SourceError { index, error } => {
                println!("  Data connection ended at payload {index}: {error}");
            }
            RetrievalEnd::PayloadCap { limit } => {
                println!("  Stopped at the payload cap of {limit}");
            }
            _ => {}
        }
    }

    match &report.status {
        RoutineStatus::Completed if report.failed_steps() == 0 => println!("✓ Routine completed"),
        RoutineStatus::Completed => {
            println!("⚠ Routine completed with {} failed steps", report.failed_steps());
        }
        RoutineStatus::Aborted {
            reason: AbortReason::ForceStop { next_step },
        } => println!("✗ Routine stopped before {next_step}; landing was issued"),
        RoutineStatus::Aborted {
            reason: AbortReason::StepFailed { step, message },
        } => println!("✗ Routine aborted after {step} failed: {message}"),
        RoutineStatus::Aborted {
            reason: AbortReason::LandingNotIssued { message },
        } => println!("✗ Landing was not issued: {message}"),
        other => println!("Routine status: {other:?}"),
    }
}

// ============================================================================
// Config Command
// ============================================================================

#[derive(Serialize)]
struct ConfigEntry {
    value: String,
    source: ConfigSource,
}

/// Print the effective configuration with the source of each value.
pub fn execute_config_command(config: &Config, json: bool) -> Result<()> {
    let entries = config_entries(config);

    if json {
        println!("{}", emit_jcs(&entries)?);
        return Ok(());
    }

    println!("Effective configuration (precedence: cli > config file > defaults)");
    for (key, entry) in &entries {
        println!("  {key:<24} = {:<48} [{}]", entry.value, entry.source);
    }
    Ok(())
}

fn config_entries(config: &Config) -> BTreeMap<&'static str, ConfigEntry> {
    let r = &config.routine;
    let t = &config.retrieval;
    let c = &config.classifier;
    let optional = |value: Option<String>| value.unwrap_or_else(|| "(none)".to_string());

    let values = [
        ("platform", r.platform.clone()),
        ("strategy", r.strategy.as_str().to_string()),
        ("failure_policy", r.failure_policy.as_str().to_string()),
        ("dump_captures", r.dump_captures.to_string()),
        ("command_timeout_secs", r.command_timeout_secs.to_string()),
        ("wait_mode", format!("{:?}", r.wait_mode).to_lowercase()),
        ("poll_interval_ms", r.poll_interval_ms.to_string()),
        ("verbose", r.verbose.to_string()),
        ("services.flight", config.services.flight.clone()),
        ("services.gimbal", config.services.gimbal.clone()),
        ("services.camera", config.services.camera.clone()),
        ("services.trace", config.services.trace.clone()),
        ("default_endpoint", config.transport.default_endpoint.clone()),
        ("endpoints", format!("{} overrides", config.transport.endpoints.len())),
        ("data_endpoint", t.data_endpoint.clone()),
        ("query_descriptor", t.query_descriptor.clone()),
        ("working_image", t.working_image.display().to_string()),
        (
            "capture_image",
            optional(t.capture_image.as_ref().map(|p| p.display().to_string())),
        ),
        ("positives_dir", t.positives_dir.display().to_string()),
        ("negatives_dir", t.negatives_dir.display().to_string()),
        ("file_prefix", t.file_prefix.clone()),
        ("file_extension", t.file_extension.clone()),
        ("max_payloads", optional(t.max_payloads.map(|n| n.to_string()))),
        ("max_payload_bytes", t.max_payload_bytes.to_string()),
        ("read_timeout_secs", optional(t.read_timeout_secs.map(|n| n.to_string()))),
        ("classifier.program", optional(c.program.clone())),
        ("classifier.args", c.args.join(" ")),
        ("classifier.timeout_secs", c.timeout_secs.to_string()),
    ];

    values
        .into_iter()
        .map(|(key, value)| {
            (
                key,
                ConfigEntry {
                    value,
                    source: config.source_of(key),
                },
            )
        })
        .collect()
}
