//! skyroutine - sequential drone routine orchestration over asynchronous driver commands
//!
//! skyroutine drives a set of remote drivers (flight control, gimbal, camera,
//! trace store) through a fixed routine. Every driver call is asynchronous:
//! dispatch returns an acknowledgement at once and the response arrives later.
//! The routine turns that into strictly sequential steps, one command in
//! flight at a time, and always finishes by issuing landing.
//!
//! skyroutine can be used in two ways:
//! - **CLI**: `skyroutine run dp=mission42`
//! - **Library**: build a [`Routine`] from a [`Config`] and a set of [`RoutineDeps`]
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Full routine: capture, then retrieve and classify every stored image
//! skyroutine run dp=mission42
//!
//! # Capture only, as canonical JSON
//! skyroutine run dp=mission42 --capture-only --json
//!
//! # Effective configuration
//! skyroutine config
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use skyroutine::{
//!     Config, HttpTransport, Routine, RoutineDeps, RoutineParams, TcpPayloadSource,
//!     UnconfiguredClassifier,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let deps = RoutineDeps {
//!         transport: Arc::new(HttpTransport::new_from_config(&config)?),
//!         source: Arc::new(TcpPayloadSource::from_config(&config.retrieval)),
//!         classifier: Arc::new(UnconfiguredClassifier),
//!     };
//!
//!     let params = RoutineParams::parse("dp=mission42")?;
//!     let mut routine = Routine::new(&config, params, deps, Path::new("."));
//!     let report = routine.run().await;
//!     println!("{}", skyroutine::emit_jcs(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! # JSON Contracts
//!
//! Routine reports are emitted in JCS (RFC 8785) canonical form. Use
//! [`emit_jcs`] for your own integrations.

// ============================================================================
// Stable Public API
// ============================================================================

pub use skyroutine_config::{CliArgs, Config};
pub use skyroutine_utils::canonicalization::emit_jcs;
pub use skyroutine_utils::error::{
    ClassifyError, ConfigError, ParamsError, RetrievalError, RoutineError, TransportError,
    UserFriendlyError,
};
pub use skyroutine_utils::exit_codes::ExitCode;
pub use skyroutine_utils::types::{FailurePolicy, RoutineStrategy, ServiceId, WaitMode};

pub use skyroutine_orchestrator::{
    AbortReason, BarrierLatch, BatchQuery, BulkRetrieval, CaptureCheck, Classification,
    ClassificationAdapter, Classifier, CommandChannel, CommandClassifier, CommandInvoker, CommandOutcome,
    CommandRequest, CommandTimeout, DispatchAck, ImageSinks, LatchState, PayloadSource,
    RetrievalEnd, RetrievalSummary, Routine, RoutineDeps, RoutineReport, RoutineStatus,
    RoutineStep, StepRecord, StepStatus, StopHandle, TcpPayloadSource, UnconfiguredClassifier,
    WaitStrategy,
};
pub use skyroutine_transport::{
    CommandResponse, DriverArgs, DriverCommand, DriverTransport, HttpTransport, RoutineParams,
};

// ============================================================================
// CLI
// ============================================================================

pub mod cli;
