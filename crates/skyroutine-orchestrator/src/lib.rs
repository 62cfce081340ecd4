//! Routine orchestration for skyroutine
//!
//! This crate drives remote drivers through a fixed routine, one command at a
//! time, and pulls retrieved images through a classifier.
//!
//! # Architecture
//!
//! - **`BarrierLatch`** (`latch.rs`): single-slot rendezvous between a
//!   command's completion and the waiting routine
//! - **`CommandInvoker`** (`invoker.rs`): dispatches one command, returns a
//!   `DispatchAck` at once, completes through a single-use `CompletionSink`
//! - **`CommandChannel`** (`channel.rs`): reset, invoke, wait; never pipelined
//! - **`Routine`** (`orchestrator.rs`): the step sequence with force stop,
//!   failure policy and guaranteed landing
//! - **`BulkRetrieval`** (`retrieval.rs`): query batch `n`, read one payload,
//!   stop on the empty sentinel
//! - **`ClassificationAdapter`** (`classify.rs`): stage, classify, file into
//!   the positive or negative set
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use skyroutine_config::Config;
//! use skyroutine_orchestrator::{Routine, RoutineDeps, TcpPayloadSource, UnconfiguredClassifier};
//! use skyroutine_transport::{HttpTransport, RoutineParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let deps = RoutineDeps {
//!         transport: Arc::new(HttpTransport::new_from_config(&config)?),
//!         source: Arc::new(TcpPayloadSource::from_config(&config.retrieval)),
//!         classifier: Arc::new(UnconfiguredClassifier),
//!     };
//!     let params = RoutineParams::parse("dp=mission42")?;
//!
//!     let mut routine = Routine::new(&config, params, deps, Path::new("."));
//!     let report = routine.run().await;
//!     println!("{}", report.to_canonical_json()?);
//!     Ok(())
//! }
//! ```

mod channel;
mod classify;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;
mod invoker;
mod latch;
mod orchestrator;
mod report;
mod retrieval;
mod sinks;
mod steps;

pub use self::channel::{CommandChannel, ExecutedCommand};
pub use self::classify::{
    Classification, ClassificationAdapter, ClassifiedImage, Classifier, CommandClassifier,
    StagedImage, UnconfiguredClassifier,
};
pub use self::invoker::{
    CommandFailure, CommandInvoker, CommandOutcome, CommandRequest, CommandTimeout, DispatchAck,
    FailureKind,
};
pub use self::latch::{BarrierLatch, CompletionSink, LatchState, WaitStrategy};
pub use self::orchestrator::{
    ROUTINE_NAME, Routine, RoutineDeps, RoutineOptions, StopHandle, wait_strategy,
};
pub use self::report::{
    AbortReason, CaptureCheck, RoutineReport, RoutineStatus, StepRecord, StepStatus,
};
pub use self::retrieval::{
    BatchQuery, BulkRetrieval, ImagePayload, PayloadSource, QueryVerdict, RetrievalEnd,
    RetrievalSummary, RetrievedImage, TcpPayloadSource,
};
pub use self::sinks::ImageSinks;
pub use self::steps::{DriverRole, RoutineServices, RoutineStep, StepContext, mission_plan};
