//! Routine steps and the driver command each one sends.

use serde::{Deserialize, Serialize};
use std::fmt;

use skyroutine_config::{Config, ServicesConfig};
use skyroutine_transport::{DriverArgs, DriverCommand, RoutineParams};
use skyroutine_utils::error::TransportError;
use skyroutine_utils::types::{RoutineStrategy, ServiceId};

use crate::invoker::CommandRequest;

/// Which driver a step talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverRole {
    Flight,
    Gimbal,
    Camera,
    Trace,
}

/// Driver service ids resolved from `[services]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineServices {
    pub flight: ServiceId,
    pub gimbal: ServiceId,
    pub camera: ServiceId,
    pub trace: ServiceId,
}

impl RoutineServices {
    #[must_use]
    pub fn service(&self, role: DriverRole) -> &ServiceId {
        match role {
            DriverRole::Flight => &self.flight,
            DriverRole::Gimbal => &self.gimbal,
            DriverRole::Camera => &self.camera,
            DriverRole::Trace => &self.trace,
        }
    }
}

impl From<&ServicesConfig> for RoutineServices {
    fn from(services: &ServicesConfig) -> Self {
        Self {
            flight: ServiceId::new(services.flight.clone()),
            gimbal: ServiceId::new(services.gimbal.clone()),
            camera: ServiceId::new(services.camera.clone()),
            trace: ServiceId::new(services.trace.clone()),
        }
    }
}

/// Values substituted into step arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    /// Trailing platform tag on every command
    pub platform: String,
    /// Working directory from the routine parameters
    pub working_dir: String,
    pub query_descriptor: String,
}

impl StepContext {
    #[must_use]
    pub fn new(config: &Config, params: &RoutineParams) -> Self {
        Self {
            platform: config.routine.platform.clone(),
            working_dir: params.working_dir().to_string(),
            query_descriptor: config.retrieval.query_descriptor.clone(),
        }
    }
}

/// One step of the routine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RoutineStep {
    Takeoff,
    Calibrate,
    CameraDirectory,
    Capture,
    DumpCaptures,
    TraceDirectory,
    QueryBatch { index: u64 },
    Landing,
}

impl RoutineStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Calibrate => "calibrate",
            Self::CameraDirectory => "camera_directory",
            Self::Capture => "capture",
            Self::DumpCaptures => "dump_captures",
            Self::TraceDirectory => "trace_directory",
            Self::QueryBatch { .. } => "query_batch",
            Self::Landing => "landing",
        }
    }

    #[must_use]
    pub const fn role(&self) -> DriverRole {
        match self {
            Self::Takeoff | Self::Landing => DriverRole::Flight,
            Self::Calibrate => DriverRole::Gimbal,
            Self::CameraDirectory | Self::Capture | Self::DumpCaptures => DriverRole::Camera,
            Self::TraceDirectory | Self::QueryBatch { .. } => DriverRole::Trace,
        }
    }

    #[must_use]
    pub const fn command(&self) -> DriverCommand {
        match self {
            Self::Takeoff => DriverCommand::Lft,
            Self::Calibrate => DriverCommand::Cal,
            Self::CameraDirectory | Self::TraceDirectory => DriverCommand::Dir,
            Self::Capture => DriverCommand::Get,
            Self::DumpCaptures => DriverCommand::Dmp,
            Self::QueryBatch { .. } => DriverCommand::Qrb,
            Self::Landing => DriverCommand::Lnd,
        }
    }

    /// Encoded driver arguments for this step.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidArgument` if a substituted value
    /// contains a delimiter.
    pub fn args(&self, ctx: &StepContext) -> Result<DriverArgs, TransportError> {
        let builder = DriverArgs::command(self.command());
        let builder = match self {
            Self::CameraDirectory | Self::TraceDirectory => builder.param(ctx.working_dir.clone()),
            Self::QueryBatch { index } => builder
                .param(ctx.query_descriptor.clone())
                .param(index.to_string()),
            _ => builder,
        };
        builder.param(ctx.platform.clone()).build()
    }

    /// Build the request for this step.
    ///
    /// # Errors
    ///
    /// See [`RoutineStep::args`].
    pub fn request(
        &self,
        services: &RoutineServices,
        ctx: &StepContext,
    ) -> Result<CommandRequest, TransportError> {
        Ok(CommandRequest::new(
            services.service(self.role()).clone(),
            self.args(ctx)?,
        ))
    }
}

impl fmt::Display for RoutineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryBatch { index } => write!(f, "query_batch[{index}]"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Mission steps between takeoff and the retrieval loop, in order.
///
/// Landing is not part of the plan; the routine always issues it last.
#[must_use]
pub fn mission_plan(strategy: RoutineStrategy, dump_captures: bool) -> Vec<RoutineStep> {
    let mut steps = vec![
        RoutineStep::Takeoff,
        RoutineStep::Calibrate,
        RoutineStep::CameraDirectory,
        RoutineStep::Capture,
    ];
    if dump_captures {
        steps.push(RoutineStep::DumpCaptures);
    }
    if strategy == RoutineStrategy::BulkRetrieval {
        steps.push(RoutineStep::TraceDirectory);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StepContext {
        StepContext {
            platform: "AUAVsim".to_string(),
            working_dir: "mission42".to_string(),
            query_descriptor: "face".to_string(),
        }
    }

    #[test]
    fn test_step_arguments() {
        let ctx = ctx();
        let encoded = |step: RoutineStep| step.args(&ctx).unwrap().encode();

        assert_eq!(encoded(RoutineStep::Takeoff), "dc=lft-dp=AUAVsim");
        assert_eq!(encoded(RoutineStep::Calibrate), "dc=cal-dp=AUAVsim");
        assert_eq!(
            encoded(RoutineStep::CameraDirectory),
            "dc=dir-dp=mission42-dp=AUAVsim"
        );
        assert_eq!(encoded(RoutineStep::Capture), "dc=get-dp=AUAVsim");
        assert_eq!(
            encoded(RoutineStep::QueryBatch { index: 3 }),
            "dc=qrb-dp=face-dp=3-dp=AUAVsim"
        );
        assert_eq!(encoded(RoutineStep::Landing), "dc=lnd-dp=AUAVsim");
    }

    #[test]
    fn test_step_roles() {
        let services = RoutineServices::from(&ServicesConfig::default());
        let request = RoutineStep::TraceDirectory.request(&services, &ctx()).unwrap();
        assert_eq!(request.service.short_name(), "ExternalTraceDriver");
        assert_eq!(RoutineStep::Landing.role(), DriverRole::Flight);
    }

    #[test]
    fn test_mission_plan_variants() {
        assert_eq!(
            mission_plan(RoutineStrategy::CaptureOnly, false),
            vec![
                RoutineStep::Takeoff,
                RoutineStep::Calibrate,
                RoutineStep::CameraDirectory,
                RoutineStep::Capture,
            ]
        );
        let bulk = mission_plan(RoutineStrategy::BulkRetrieval, true);
        assert_eq!(bulk.len(), 6);
        assert_eq!(bulk[4], RoutineStep::DumpCaptures);
        assert_eq!(bulk[5], RoutineStep::TraceDirectory);
    }

    #[test]
    fn test_display_includes_index() {
        assert_eq!(RoutineStep::QueryBatch { index: 7 }.to_string(), "query_batch[7]");
        assert_eq!(RoutineStep::Capture.to_string(), "capture");
    }
}
