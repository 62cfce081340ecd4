//! Sequential routine.
//!
//! Runs the mission plan one command at a time, then either enters the bulk
//! retrieval loop or classifies the local capture, and always finishes with
//! landing. Force stop is checked
//! at every step boundary and before every retrieval query; an in-flight
//! command is never interrupted.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, error, info, warn};

use skyroutine_config::Config;
use skyroutine_transport::{DriverTransport, RoutineParams};
use skyroutine_utils::logging::{log_step_complete, log_step_error, log_step_start, step_span};
use skyroutine_utils::types::{FailurePolicy, RoutineStrategy, WaitMode};

use crate::channel::CommandChannel;
use crate::classify::{Classification, ClassificationAdapter, Classifier};
use crate::invoker::{CommandInvoker, CommandTimeout};
use crate::latch::{BarrierLatch, WaitStrategy};
use crate::report::{
    AbortReason, CaptureCheck, RoutineReport, RoutineStatus, StepRecord, StepStatus,
};
use crate::retrieval::{BatchQuery, BulkRetrieval, PayloadSource, QueryVerdict, RetrievalEnd};
use crate::sinks::ImageSinks;
use crate::steps::{RoutineServices, RoutineStep, StepContext, mission_plan};

/// Name used in logs and reports
pub const ROUTINE_NAME: &str = "skyroutine";

/// Cloneable force-stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// External collaborators of a routine.
pub struct RoutineDeps {
    pub transport: Arc<dyn DriverTransport>,
    pub source: Arc<dyn PayloadSource>,
    pub classifier: Arc<dyn Classifier>,
}

/// Behavior switches resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineOptions {
    pub strategy: RoutineStrategy,
    pub failure_policy: FailurePolicy,
    pub dump_captures: bool,
    pub max_payloads: Option<u64>,
}

impl RoutineOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy: config.routine.strategy,
            failure_policy: config.routine.failure_policy,
            dump_captures: config.routine.dump_captures,
            max_payloads: config.retrieval.max_payloads,
        }
    }
}

/// Wait strategy configured in `[routine]`.
#[must_use]
pub fn wait_strategy(config: &Config) -> WaitStrategy {
    match config.routine.wait_mode {
        WaitMode::Notify => WaitStrategy::Notify,
        WaitMode::Poll => WaitStrategy::Poll {
            interval: config.poll_interval(),
        },
    }
}

/// One routine instance. Owns its latch; nothing is shared between routines.
pub struct Routine {
    channel: CommandChannel,
    services: RoutineServices,
    ctx: StepContext,
    params: RoutineParams,
    options: RoutineOptions,
    retrieval: BulkRetrieval,
    capture_image: PathBuf,
    stop: StopHandle,
    status: RoutineStatus,
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routine")
            .field("params", &self.params)
            .field("options", &self.options)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Routine {
    /// Build a routine from configuration. Relative output paths are taken
    /// relative to `output_base`.
    #[must_use]
    pub fn new(config: &Config, params: RoutineParams, deps: RoutineDeps, output_base: &Path) -> Self {
        let invoker = CommandInvoker::new(deps.transport, CommandTimeout::from_config(config));
        let channel = CommandChannel::new(invoker, BarrierLatch::new(wait_strategy(config)));
        let options = RoutineOptions::from_config(config);
        let capture_image = output_base.join(
            config
                .retrieval
                .capture_image
                .clone()
                .unwrap_or_else(|| PathBuf::from(params.working_dir())),
        );
        let adapter = ClassificationAdapter::new(
            deps.classifier,
            ImageSinks::from_config(&config.retrieval, output_base),
        );

        Self {
            channel,
            services: RoutineServices::from(&config.services),
            ctx: StepContext::new(config, &params),
            params,
            retrieval: BulkRetrieval::new(deps.source, adapter)
                .with_max_payloads(options.max_payloads),
            capture_image,
            options,
            stop: StopHandle::new(),
            status: RoutineStatus::NotStarted,
        }
    }

    /// Share an externally owned stop flag (for example one tripped by Ctrl-C).
    #[must_use]
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn status(&self) -> &RoutineStatus {
        &self.status
    }

    #[must_use]
    pub fn latch(&self) -> &BarrierLatch {
        self.channel.latch()
    }

    /// Run the routine to completion.
    ///
    /// Never fails: step failures and retrieval errors are recorded in the
    /// report, and landing is issued on every path.
    pub async fn run(&mut self) -> RoutineReport {
        let started_at = Utc::now();
        self.status = RoutineStatus::Running;
        info!(
            routine = ROUTINE_NAME,
            working_dir = %self.params.working_dir(),
            strategy = self.options.strategy.as_str(),
            policy = self.options.failure_policy.as_str(),
            "Routine started"
        );

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut abort: Option<AbortReason> = None;

        let plan = mission_plan(self.options.strategy, self.options.dump_captures);
        let mut steps = plan.into_iter();

        for step in steps.by_ref() {
            if self.stop.is_stop_requested() {
                info!(step = %step, "Force stop requested, skipping to landing");
                abort = Some(AbortReason::ForceStop {
                    next_step: step.to_string(),
                });
                skipped.push(step);
                break;
            }

            let record = self.execute_step(step).await;
            let failed = record.status.is_failure();
            let message = record.response.clone();
            records.push(record);

            if failed && self.options.failure_policy == FailurePolicy::AbortToLanding {
                warn!(step = %step, "Step failed, aborting to landing");
                abort = Some(AbortReason::StepFailed {
                    step: step.to_string(),
                    message,
                });
                break;
            }
        }
        skipped.extend(steps);

        let retrieval = if self.options.strategy == RoutineStrategy::BulkRetrieval && abort.is_none() {
            let mut queries = RoutineQueries {
                channel: &mut self.channel,
                services: &self.services,
                ctx: &self.ctx,
                stop: &self.stop,
                policy: self.options.failure_policy,
                records: &mut records,
            };
            let summary = self.retrieval.run(&mut queries).await;
            match &summary.end {
                RetrievalEnd::Stopped { index } => {
                    abort = Some(AbortReason::ForceStop {
                        next_step: RoutineStep::QueryBatch { index: *index }.to_string(),
                    });
                }
                RetrievalEnd::Aborted { index, message } => {
                    abort = Some(AbortReason::StepFailed {
                        step: RoutineStep::QueryBatch { index: *index }.to_string(),
                        message: message.clone(),
                    });
                }
                _ => {}
            }
            Some(summary)
        } else {
            None
        };

        let capture = if self.options.strategy == RoutineStrategy::CaptureOnly && abort.is_none() {
            Some(self.check_capture().await)
        } else {
            None
        };

        // Landing is issued on every path.
        let landing = self.execute_step(RoutineStep::Landing).await;
        if landing.seq.is_none() {
            error!(response = %landing.response, "Landing command could not be built and was not sent");
            abort = Some(AbortReason::LandingNotIssued {
                message: landing.response.clone(),
            });
        } else if landing.status.is_failure() {
            warn!(response = %landing.response, "Landing command failed");
        }
        records.push(landing);

        self.status = match abort {
            Some(reason) => RoutineStatus::Aborted { reason },
            None => RoutineStatus::Completed,
        };
        info!(routine = ROUTINE_NAME, status = ?self.status, "Routine finished");

        RoutineReport {
            routine: ROUTINE_NAME.to_string(),
            params: self.params.raw().to_string(),
            working_dir: self.params.working_dir().to_string(),
            strategy: self.options.strategy,
            failure_policy: self.options.failure_policy,
            status: self.status.clone(),
            steps: records,
            skipped,
            capture,
            retrieval,
            latch_transitions: self.channel.latch().reached_count(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Classify the local copy of the captured image before landing.
    async fn check_capture(&self) -> CaptureCheck {
        let path = &self.capture_image;
        let classification = self.retrieval.adapter().classify_file(path).await;
        match &classification {
            Classification::Positive => info!(path = %path.display(), "Captured image contains a face"),
            Classification::Negative => info!(path = %path.display(), "Captured image has no face"),
            Classification::Unclassified { reason } => {
                warn!(path = %path.display(), reason = %reason, "Captured image left unclassified");
            }
        }
        CaptureCheck {
            path: path.display().to_string(),
            classification,
        }
    }

    async fn execute_step(&mut self, step: RoutineStep) -> StepRecord {
        run_step(&mut self.channel, &self.services, &self.ctx, step).await
    }
}

/// Build, send, and await one step, logging it under a step span.
async fn run_step(
    channel: &mut CommandChannel,
    services: &RoutineServices,
    ctx: &StepContext,
    step: RoutineStep,
) -> StepRecord {
    let span = step_span(ROUTINE_NAME, &step.to_string());
    async move {
        let request = match step.request(services, ctx) {
            Ok(request) => request,
            Err(e) => {
                // Not dispatched: a substituted value had a reserved character
                log_step_error(ROUTINE_NAME, &step.to_string(), &e.to_string(), 0);
                return StepRecord {
                    step,
                    service: services.service(step.role()).clone(),
                    args: String::new(),
                    seq: None,
                    status: StepStatus::DispatchFailure,
                    response: e.to_string(),
                    duration_ms: 0,
                };
            }
        };

        log_step_start(
            ROUTINE_NAME,
            &step.to_string(),
            request.service.short_name(),
        );
        let executed = channel.execute(request).await;
        let record = StepRecord::new(step, &executed);

        if record.status.is_failure() {
            log_step_error(
                ROUTINE_NAME,
                &step.to_string(),
                &record.response,
                executed.duration.as_millis(),
            );
        } else {
            log_step_complete(
                ROUTINE_NAME,
                &step.to_string(),
                &record.response,
                executed.duration.as_millis(),
            );
        }
        record
    }
    .instrument(span)
    .await
}

/// Issues `qrb` queries on behalf of the retrieval loop.
struct RoutineQueries<'a> {
    channel: &'a mut CommandChannel,
    services: &'a RoutineServices,
    ctx: &'a StepContext,
    stop: &'a StopHandle,
    policy: FailurePolicy,
    records: &'a mut Vec<StepRecord>,
}

#[async_trait]
impl BatchQuery for RoutineQueries<'_> {
    async fn query(&mut self, index: u64) -> QueryVerdict {
        if self.stop.is_stop_requested() {
            info!(index, "Force stop requested, ending retrieval");
            return QueryVerdict::Stopped;
        }

        let record = run_step(
            self.channel,
            self.services,
            self.ctx,
            RoutineStep::QueryBatch { index },
        )
        .await;
        let verdict = if record.status.is_failure() && self.policy == FailurePolicy::AbortToLanding {
            QueryVerdict::Abort {
                reason: record.response.clone(),
            }
        } else {
            QueryVerdict::Proceed
        };
        self.records.push(record);
        verdict
    }
}
