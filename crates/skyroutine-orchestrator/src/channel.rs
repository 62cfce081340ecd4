//! Request-then-wait pairing of the invoker and the latch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::invoker::{CommandInvoker, CommandOutcome, CommandRequest, DispatchAck};
use crate::latch::BarrierLatch;

/// A finished request.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub request: CommandRequest,
    pub ack: DispatchAck,
    pub outcome: CommandOutcome,
    pub duration: Duration,
}

/// Issues one command at a time and waits on the latch for its outcome.
///
/// `execute` takes `&mut self`, so a routine can never have two requests
/// outstanding on the same channel.
#[derive(Debug)]
pub struct CommandChannel {
    invoker: CommandInvoker,
    latch: Arc<BarrierLatch>,
}

impl CommandChannel {
    #[must_use]
    pub fn new(invoker: CommandInvoker, latch: BarrierLatch) -> Self {
        Self {
            invoker,
            latch: Arc::new(latch),
        }
    }

    #[must_use]
    pub fn latch(&self) -> &BarrierLatch {
        &self.latch
    }

    #[must_use]
    pub fn invoker(&self) -> &CommandInvoker {
        &self.invoker
    }

    /// Reset the latch, dispatch `request`, wait for its outcome, reset again.
    pub async fn execute(&mut self, request: CommandRequest) -> ExecutedCommand {
        self.latch.reset();
        let started = Instant::now();

        let ack = self.invoker.invoke(request.clone(), self.latch.sink());
        let outcome = self.latch.await_reached().await;
        self.latch.reset();

        ExecutedCommand {
            request,
            ack,
            outcome,
            duration: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::CommandTimeout;
    use crate::latch::{LatchState, WaitStrategy};
    use skyroutine_transport::{DriverArgs, DriverCommand, ScriptedTransport};
    use skyroutine_utils::types::ServiceId;

    #[tokio::test]
    async fn test_one_transition_per_command() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut channel = CommandChannel::new(
            CommandInvoker::new(transport.clone(), CommandTimeout::default()),
            BarrierLatch::new(WaitStrategy::Notify),
        );

        for command in [DriverCommand::Lft, DriverCommand::Cal, DriverCommand::Lnd] {
            let args = DriverArgs::command(command).param("AUAVsim").build().unwrap();
            let executed = channel
                .execute(CommandRequest::new(ServiceId::new("svc"), args))
                .await;
            assert!(executed.outcome.is_success());
        }

        assert_eq!(channel.latch().reached_count(), 3);
        assert_eq!(channel.latch().released_count(), 3);
        assert_eq!(channel.latch().state(), LatchState::Free);
        assert_eq!(transport.calls().len(), 3);
    }
}
