//! Command invoker: fire one driver command and report its completion
//! through a [`CompletionSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use skyroutine_config::Config;
use skyroutine_transport::{CommandResponse, DriverArgs, DriverCommand, DriverTransport};
use skyroutine_utils::error::TransportError;
use skyroutine_utils::types::ServiceId;

use crate::latch::CompletionSink;

/// Per-request timeout for driver commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeout {
    pub duration: Duration,
}

impl CommandTimeout {
    /// Default timeout in seconds
    pub const DEFAULT_SECS: u64 = 30;

    /// Minimum timeout in seconds
    pub const MIN_SECS: u64 = 1;

    /// Create a `CommandTimeout`, clamped to [`Self::MIN_SECS`].
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs.max(Self::MIN_SECS)),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_secs(config.routine.command_timeout_secs)
    }
}

impl Default for CommandTimeout {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}

/// One driver command, immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub service: ServiceId,
    pub args: DriverArgs,
}

impl CommandRequest {
    #[must_use]
    pub fn new(service: ServiceId, args: DriverArgs) -> Self {
        Self { service, args }
    }
}

/// Acknowledgement that a request was handed to the transport.
///
/// Says nothing about whether the driver has replied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    /// Position in this invoker's issuance order, from 0
    pub seq: u64,
    pub service: ServiceId,
    pub command: Option<DriverCommand>,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request could not be delivered
    Dispatch,
    /// No reply within the command timeout
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// How a request finished. Produced exactly once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The driver replied; `success` may still be false.
    Completed(CommandResponse),
    Failed(CommandFailure),
}

impl CommandOutcome {
    /// True when the driver replied with a success status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(response) if response.success)
    }

    /// Response text, or the failure message.
    #[must_use]
    pub fn response_text(&self) -> &str {
        match self {
            Self::Completed(response) => &response.text,
            Self::Failed(failure) => &failure.message,
        }
    }

    fn from_transport(result: Result<CommandResponse, TransportError>) -> Self {
        match result {
            Ok(response) => Self::Completed(response),
            Err(err @ TransportError::Timeout { .. }) => Self::Failed(CommandFailure {
                kind: FailureKind::TimedOut,
                message: err.to_string(),
            }),
            Err(err) => Self::Failed(CommandFailure {
                kind: FailureKind::Dispatch,
                message: err.to_string(),
            }),
        }
    }
}

/// Issues driver commands without waiting for their replies.
pub struct CommandInvoker {
    transport: Arc<dyn DriverTransport>,
    timeout: CommandTimeout,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for CommandInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInvoker")
            .field("transport", &self.transport.name())
            .field("timeout", &self.timeout)
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}

impl CommandInvoker {
    #[must_use]
    pub fn new(transport: Arc<dyn DriverTransport>, timeout: CommandTimeout) -> Self {
        Self {
            transport,
            timeout,
            next_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> CommandTimeout {
        self.timeout
    }

    /// Number of requests dispatched so far.
    #[must_use]
    pub fn dispatched_count(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Dispatch `request` and return at once.
    ///
    /// The transport call runs on a spawned task bounded by the command
    /// timeout. Its outcome, success or not, is delivered through `sink`
    /// exactly once. Must be called from within a tokio runtime.
    pub fn invoke(&self, request: CommandRequest, sink: CompletionSink) -> DispatchAck {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let ack = DispatchAck {
            seq,
            service: request.service.clone(),
            command: request.args.driver_command(),
            dispatched_at: Utc::now(),
        };

        debug!(
            seq,
            service = %request.service.short_name(),
            args = %request.args,
            transport = self.transport.name(),
            "Dispatching driver command"
        );

        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout.duration;
        tokio::spawn(async move {
            let CommandRequest { service, args } = request;
            let result = match tokio::time::timeout(timeout, transport.call(&service, &args)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    service: service.to_string(),
                    timeout_secs: timeout.as_secs(),
                }),
            };

            let outcome = CommandOutcome::from_transport(result);
            match &outcome {
                CommandOutcome::Completed(response) if response.success => {
                    debug!(seq, service = %service.short_name(), "Driver command completed");
                }
                CommandOutcome::Completed(response) => {
                    warn!(
                        seq,
                        service = %service.short_name(),
                        response = %response.text,
                        "Driver reported failure"
                    );
                }
                CommandOutcome::Failed(failure) => {
                    warn!(
                        seq,
                        service = %service.short_name(),
                        kind = ?failure.kind,
                        error = %failure.message,
                        "Driver command failed"
                    );
                }
            }

            if !sink.complete(outcome) {
                debug!(seq, "Completion arrived after the latch moved on");
            }
        });

        ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::{BarrierLatch, WaitStrategy};
    use skyroutine_transport::{ScriptedReply, ScriptedTransport};

    fn takeoff() -> CommandRequest {
        CommandRequest::new(
            ServiceId::new("flight"),
            DriverArgs::command(DriverCommand::Lft)
                .param("AUAVsim")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_timeout_clamped_to_minimum() {
        assert_eq!(CommandTimeout::from_secs(0).duration, Duration::from_secs(1));
        assert_eq!(CommandTimeout::default().duration, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_invoke_returns_before_completion() {
        let transport = Arc::new(ScriptedTransport::new().with_reply(
            DriverCommand::Lft,
            ScriptedReply::delayed(Duration::from_millis(50), ScriptedReply::ok("airborne")),
        ));
        let invoker = CommandInvoker::new(transport, CommandTimeout::default());
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));

        let ack = invoker.invoke(takeoff(), latch.sink());

        assert_eq!(ack.seq, 0);
        assert_eq!(ack.command, Some(DriverCommand::Lft));
        assert_eq!(latch.state(), crate::latch::LatchState::Free);
        assert_eq!(latch.await_reached().await.response_text(), "airborne");
    }

    #[tokio::test]
    async fn test_dispatch_failure_still_releases_latch() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_reply(DriverCommand::Lft, ScriptedReply::DispatchFailure("no route".into())),
        );
        let invoker = CommandInvoker::new(transport, CommandTimeout::default());
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));

        invoker.invoke(takeoff(), latch.sink());
        let outcome = latch.await_reached().await;

        match outcome {
            CommandOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Dispatch);
                assert!(failure.message.contains("no route"));
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_failed_outcome() {
        let transport = Arc::new(ScriptedTransport::new().with_reply(DriverCommand::Lft, ScriptedReply::Hang));
        let invoker = CommandInvoker::new(
            transport,
            CommandTimeout {
                duration: Duration::from_millis(30),
            },
        );
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));

        invoker.invoke(takeoff(), latch.sink());
        let outcome = latch.await_reached().await;

        assert!(matches!(
            outcome,
            CommandOutcome::Failed(CommandFailure {
                kind: FailureKind::TimedOut,
                ..
            })
        ));
        assert_eq!(latch.reached_count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_numbers_follow_issuance() {
        let transport = Arc::new(ScriptedTransport::new());
        let invoker = CommandInvoker::new(transport, CommandTimeout::default());
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));

        let mut seqs = Vec::new();
        for _ in 0..3 {
            latch.reset();
            seqs.push(invoker.invoke(takeoff(), latch.sink()).seq);
            latch.await_reached().await;
        }

        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(invoker.dispatched_count(), 3);
    }
}
