//! Scripted transport for tests.
//!
//! Records every call in issuance order and answers from a per-command
//! script. Unscripted commands succeed with `"<command>: ok"`.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use skyroutine_utils::error::TransportError;
use skyroutine_utils::types::ServiceId;

use crate::args::{DriverArgs, DriverCommand};
use crate::transport::{CommandResponse, DriverTransport};

type CallHook = Box<dyn Fn(&RecordedCall) + Send + Sync>;

/// How the scripted driver answers one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Driver executed the command
    Ok(String),
    /// Driver ran and reported an error status
    RemoteFailure(String),
    /// Request never reached the driver
    DispatchFailure(String),
    /// Answer after a delay
    Delayed(Duration, Box<ScriptedReply>),
    /// Never answer
    Hang,
}

impl ScriptedReply {
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    #[must_use]
    pub fn delayed(delay: Duration, reply: ScriptedReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// One call as seen by the scripted driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Zero-based position in issuance order
    pub seq: usize,
    pub service: ServiceId,
    pub args: DriverArgs,
}

impl RecordedCall {
    #[must_use]
    pub fn command(&self) -> Option<DriverCommand> {
        self.args.driver_command()
    }
}

#[derive(Default)]
struct Script {
    sticky: HashMap<DriverCommand, ScriptedReply>,
    queued: HashMap<DriverCommand, VecDeque<ScriptedReply>>,
    hooks: Vec<(DriverCommand, CallHook)>,
}

/// In-memory [`DriverTransport`] that replays a script.
///
/// ```rust
/// use skyroutine_transport::{DriverCommand, ScriptedReply, ScriptedTransport};
///
/// let transport = ScriptedTransport::new()
///     .with_reply(DriverCommand::Cal, ScriptedReply::DispatchFailure("gimbal offline".into()));
/// assert!(transport.calls().is_empty());
/// ```
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.calls().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `command` with `reply` unless a queued reply is pending.
    #[must_use]
    pub fn with_reply(self, command: DriverCommand, reply: ScriptedReply) -> Self {
        self.lock_script().sticky.insert(command, reply);
        self
    }

    /// Answer the next `command` with `reply`; queued replies are used in order.
    #[must_use]
    pub fn with_reply_once(self, command: DriverCommand, reply: ScriptedReply) -> Self {
        self.lock_script()
            .queued
            .entry(command)
            .or_default()
            .push_back(reply);
        self
    }

    /// Run `hook` synchronously each time `command` is received, before replying.
    #[must_use]
    pub fn on_command<F>(self, command: DriverCommand, hook: F) -> Self
    where
        F: Fn(&RecordedCall) + Send + Sync + 'static,
    {
        self.lock_script().hooks.push((command, Box::new(hook)));
        self
    }

    /// Every call received so far, in issuance order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Driver commands received so far, in issuance order.
    #[must_use]
    pub fn commands(&self) -> Vec<DriverCommand> {
        self.calls().iter().filter_map(RecordedCall::command).collect()
    }

    #[must_use]
    pub fn count_of(&self, command: DriverCommand) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_reply(&self, call: &RecordedCall) -> ScriptedReply {
        let mut script = self.lock_script();
        let Some(command) = call.command() else {
            return ScriptedReply::RemoteFailure(format!("unknown command: {}", call.args));
        };

        for (cmd, hook) in &script.hooks {
            if *cmd == command {
                hook(call);
            }
        }

        if let Some(reply) = script.queued.get_mut(&command).and_then(VecDeque::pop_front) {
            return reply;
        }
        script
            .sticky
            .get(&command)
            .cloned()
            .unwrap_or_else(|| ScriptedReply::Ok(format!("{command}: ok")))
    }
}

async fn play(service: &ServiceId, reply: ScriptedReply) -> Result<CommandResponse, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            ScriptedReply::Ok(text) => return Ok(CommandResponse::ok(text)),
            ScriptedReply::RemoteFailure(text) => return Ok(CommandResponse::remote_failure(text)),
            ScriptedReply::DispatchFailure(reason) => {
                return Err(TransportError::Dispatch {
                    service: service.to_string(),
                    reason,
                });
            }
            ScriptedReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            ScriptedReply::Hang => std::future::pending::<()>().await,
        }
    }
}

#[async_trait]
impl DriverTransport for ScriptedTransport {
    async fn call(
        &self,
        service: &ServiceId,
        args: &DriverArgs,
    ) -> Result<CommandResponse, TransportError> {
        let call = {
            let mut calls = self
                .calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let call = RecordedCall {
                seq: calls.len(),
                service: service.clone(),
                args: args.clone(),
            };
            calls.push(call.clone());
            call
        };

        let reply = self.next_reply(&call);
        play(service, reply).await
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(command: DriverCommand) -> DriverArgs {
        DriverArgs::command(command).param("AUAVsim").build().unwrap()
    }

    #[tokio::test]
    async fn test_default_reply_and_recording() {
        let transport = ScriptedTransport::new();
        let flight = ServiceId::new("flight");

        let first = transport.call(&flight, &args(DriverCommand::Lft)).await.unwrap();
        transport.call(&flight, &args(DriverCommand::Lnd)).await.unwrap();

        assert_eq!(first, CommandResponse::ok("lft: ok"));
        assert_eq!(
            transport.commands(),
            vec![DriverCommand::Lft, DriverCommand::Lnd]
        );
        assert_eq!(transport.calls()[1].seq, 1);
    }

    #[tokio::test]
    async fn test_queued_reply_before_sticky() {
        let transport = ScriptedTransport::new()
            .with_reply(DriverCommand::Qrb, ScriptedReply::ok("batch"))
            .with_reply_once(DriverCommand::Qrb, ScriptedReply::RemoteFailure("busy".into()));
        let trace = ServiceId::new("trace");

        let first = transport.call(&trace, &args(DriverCommand::Qrb)).await.unwrap();
        let second = transport.call(&trace, &args(DriverCommand::Qrb)).await.unwrap();

        assert!(!first.success);
        assert_eq!(second, CommandResponse::ok("batch"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_and_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let transport = ScriptedTransport::new()
            .with_reply(
                DriverCommand::Cal,
                ScriptedReply::DispatchFailure("gimbal offline".into()),
            )
            .on_command(DriverCommand::Cal, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let err = transport
            .call(&ServiceId::new("gimbal"), &args(DriverCommand::Cal))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Dispatch { ref reason, .. } if reason == "gimbal offline"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(transport.count_of(DriverCommand::Cal), 1);
    }

    #[tokio::test]
    async fn test_delayed_reply() {
        let transport = ScriptedTransport::new().with_reply(
            DriverCommand::Get,
            ScriptedReply::delayed(Duration::from_millis(50), ScriptedReply::ok("captured")),
        );
        let started = std::time::Instant::now();

        let reply = transport
            .call(&ServiceId::new("camera"), &args(DriverCommand::Get))
            .await
            .unwrap();

        assert_eq!(reply.text, "captured");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
