//! Driver command transport for skyroutine
//!
//! Remote drivers (flight control, gimbal, camera, trace store) are reached
//! through a request/response exchange. This crate owns:
//!
//! - `args`: the `key=value` argument encoding joined by `-`
//! - `transport`: the [`DriverTransport`] trait and response types
//! - `http`: the production transport over HTTP
//! - `scripted`: a recording, scripted transport for tests (`test-utils` feature)
//!
//! The orchestrator never sees a concrete transport; it holds an
//! `Arc<dyn DriverTransport>`.

pub mod args;
pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
pub mod transport;

pub use args::{DriverArgs, DriverCommand, RoutineParams};
pub use http::HttpTransport;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{RecordedCall, ScriptedReply, ScriptedTransport};
pub use skyroutine_utils::error::TransportError;
pub use transport::{CommandResponse, DriverTransport};
