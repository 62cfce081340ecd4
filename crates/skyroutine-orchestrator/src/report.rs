//! Routine report: what was sent, what came back, what was retrieved.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyroutine_utils::canonicalization::emit_jcs;
use skyroutine_utils::exit_codes::ExitCode;
use skyroutine_utils::types::{FailurePolicy, RoutineStrategy, ServiceId};

use crate::channel::ExecutedCommand;
use crate::classify::Classification;
use crate::invoker::{CommandOutcome, FailureKind};
use crate::retrieval::RetrievalSummary;
use crate::steps::RoutineStep;

/// Routine lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RoutineStatus {
    NotStarted,
    Running,
    Completed,
    Aborted { reason: AbortReason },
}

impl RoutineStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Force stop observed at a step boundary, before `next_step` ran
    ForceStop { next_step: String },
    /// A step failed under `abort_to_landing`
    StepFailed { step: String, message: String },
    /// The landing command could not be built, so it was never sent
    LandingNotIssued { message: String },
}

/// Step status as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    RemoteFailure,
    DispatchFailure,
    TimedOut,
}

impl StepStatus {
    #[must_use]
    pub fn is_failure(self) -> bool {
        self != Self::Succeeded
    }
}

impl From<&CommandOutcome> for StepStatus {
    fn from(outcome: &CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Completed(response) if response.success => Self::Succeeded,
            CommandOutcome::Completed(_) => Self::RemoteFailure,
            CommandOutcome::Failed(failure) => match failure.kind {
                FailureKind::Dispatch => Self::DispatchFailure,
                FailureKind::TimedOut => Self::TimedOut,
            },
        }
    }
}

/// One executed driver command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(flatten)]
    pub step: RoutineStep,
    pub service: ServiceId,
    /// Encoded driver arguments
    pub args: String,
    /// Dispatch sequence number; `None` if the command was never sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub status: StepStatus,
    pub response: String,
    pub duration_ms: u64,
}

impl StepRecord {
    #[must_use]
    pub fn new(step: RoutineStep, executed: &ExecutedCommand) -> Self {
        Self {
            step,
            service: executed.request.service.clone(),
            args: executed.request.args.encode(),
            seq: Some(executed.ack.seq),
            status: StepStatus::from(&executed.outcome),
            response: executed.outcome.response_text().to_string(),
            duration_ms: u64::try_from(executed.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Local check of the captured image under `capture_only`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureCheck {
    pub path: String,
    pub classification: Classification,
}

/// Full account of one routine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineReport {
    pub routine: String,
    pub params: String,
    pub working_dir: String,
    pub strategy: RoutineStrategy,
    pub failure_policy: FailurePolicy,
    pub status: RoutineStatus,
    /// Every command issued, landing included, in issuance order
    pub steps: Vec<StepRecord>,
    /// Mission steps that never ran
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<RoutineStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalSummary>,
    /// `Free -> Reached` transitions observed on the latch
    pub latch_transitions: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoutineReport {
    /// The landing record, if landing was issued.
    #[must_use]
    pub fn landing(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .rev()
            .find(|record| record.step == RoutineStep::Landing)
    }

    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|record| record.status.is_failure())
            .count()
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self.status {
            RoutineStatus::Aborted { .. } => ExitCode::ROUTINE_ABORTED,
            _ if self.failed_steps() > 0 => ExitCode::STEP_FAILURES,
            _ => ExitCode::SUCCESS,
        }
    }

    /// Canonical JSON (RFC 8785).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<String> {
        emit_jcs(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::CommandFailure;
    use skyroutine_transport::CommandResponse;

    fn record(step: RoutineStep, status: StepStatus, seq: u64) -> StepRecord {
        StepRecord {
            step,
            service: ServiceId::new("svc"),
            args: "dc=lft-dp=AUAVsim".to_string(),
            seq: Some(seq),
            status,
            response: String::new(),
            duration_ms: 1,
        }
    }

    fn report(status: RoutineStatus, steps: Vec<StepRecord>) -> RoutineReport {
        let now = Utc::now();
        RoutineReport {
            routine: "skyroutine".to_string(),
            params: "dp=mission42".to_string(),
            working_dir: "mission42".to_string(),
            strategy: RoutineStrategy::CaptureOnly,
            failure_policy: FailurePolicy::Continue,
            status,
            steps,
            skipped: Vec::new(),
            capture: None,
            retrieval: None,
            latch_transitions: 0,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_status_from_outcome() {
        let remote = CommandOutcome::Completed(CommandResponse::remote_failure("jammed"));
        let timed_out = CommandOutcome::Failed(CommandFailure {
            kind: FailureKind::TimedOut,
            message: "late".to_string(),
        });
        assert_eq!(StepStatus::from(&remote), StepStatus::RemoteFailure);
        assert_eq!(StepStatus::from(&timed_out), StepStatus::TimedOut);
    }

    #[test]
    fn test_exit_codes() {
        let ok = report(
            RoutineStatus::Completed,
            vec![record(RoutineStep::Landing, StepStatus::Succeeded, 0)],
        );
        assert_eq!(ok.exit_code(), ExitCode::SUCCESS);

        let degraded = report(
            RoutineStatus::Completed,
            vec![
                record(RoutineStep::Calibrate, StepStatus::DispatchFailure, 0),
                record(RoutineStep::Landing, StepStatus::Succeeded, 1),
            ],
        );
        assert_eq!(degraded.exit_code(), ExitCode::STEP_FAILURES);

        let aborted = report(
            RoutineStatus::Aborted {
                reason: AbortReason::ForceStop {
                    next_step: "capture".to_string(),
                },
            },
            vec![record(RoutineStep::Landing, StepStatus::Succeeded, 0)],
        );
        assert_eq!(aborted.exit_code(), ExitCode::ROUTINE_ABORTED);

        let grounded = report(
            RoutineStatus::Aborted {
                reason: AbortReason::LandingNotIssued {
                    message: "reserved character".to_string(),
                },
            },
            Vec::new(),
        );
        assert_eq!(grounded.exit_code(), ExitCode::ROUTINE_ABORTED);
        let value = serde_json::to_value(&grounded.status).unwrap();
        assert_eq!(value["reason"]["kind"], "landing_not_issued");
    }

    #[test]
    fn test_canonical_json_shape() {
        let report = report(
            RoutineStatus::Completed,
            vec![record(RoutineStep::QueryBatch { index: 2 }, StepStatus::Succeeded, 0)],
        );
        let json = report.to_canonical_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["status"]["state"], "completed");
        assert_eq!(value["steps"][0]["step"], "query_batch");
        assert_eq!(value["steps"][0]["index"], 2);
        assert!(value.get("skipped").is_none());
        assert_eq!(json, report.to_canonical_json().unwrap());
    }
}
