//! Core transport types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use skyroutine_utils::error::TransportError;
use skyroutine_utils::types::ServiceId;

use crate::args::DriverArgs;

/// Reply from a driver that received and executed a command.
///
/// `success == false` means the driver ran but reported an error status;
/// the text still carries whatever the driver said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub text: String,
}

impl CommandResponse {
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn remote_failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Request/response exchange with a remote driver.
///
/// One call is one request; the returned future resolves exactly once with
/// the driver's reply or a transport failure. Implementations must not retry
/// on their own.
#[async_trait]
pub trait DriverTransport: Send + Sync {
    /// Deliver `args` to `service` and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Dispatch` when the request could not be
    /// delivered. Services without their own endpoint use the default one.
    async fn call(
        &self,
        service: &ServiceId,
        args: &DriverArgs,
    ) -> Result<CommandResponse, TransportError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
