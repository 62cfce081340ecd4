//! Barrier latch: single-slot rendezvous between a command's completion and
//! the routine waiting on it.
//!
//! The latch holds one state (`Free` or `Reached`) and one outcome slot under a
//! single mutex. A request gets a [`CompletionSink`] bound to the latch's
//! current generation; [`BarrierLatch::reset`] advances the generation, so a
//! late completion from an earlier request can never satisfy a later wait.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::invoker::CommandOutcome;

/// Latch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchState {
    Free,
    Reached,
}

/// How [`BarrierLatch::await_reached`] suspends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Park until the completion wakes us.
    #[default]
    Notify,
    /// Re-check the latch every `interval`.
    Poll { interval: Duration },
}

#[derive(Debug)]
struct Slot {
    state: LatchState,
    outcome: Option<CommandOutcome>,
    generation: u64,
    reached: u64,
    released: u64,
}

/// Single-slot synchronization cell owned by one routine.
#[derive(Debug)]
pub struct BarrierLatch {
    slot: Mutex<Slot>,
    notify: Notify,
    strategy: WaitStrategy,
}

impl BarrierLatch {
    #[must_use]
    pub fn new(strategy: WaitStrategy) -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: LatchState::Free,
                outcome: None,
                generation: 0,
                reached: 0,
                released: 0,
            }),
            notify: Notify::new(),
            strategy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    #[must_use]
    pub fn state(&self) -> LatchState {
        self.lock().state
    }

    /// Number of `Free -> Reached` transitions so far.
    #[must_use]
    pub fn reached_count(&self) -> u64 {
        self.lock().reached
    }

    /// Number of `Reached -> Free` transitions so far.
    #[must_use]
    pub fn released_count(&self) -> u64 {
        self.lock().released
    }

    /// Return the latch to `Free`, discard any unconsumed outcome, and
    /// invalidate sinks handed out before this call.
    pub fn reset(&self) {
        let mut slot = self.lock();
        if slot.state == LatchState::Reached {
            slot.released += 1;
        }
        slot.state = LatchState::Free;
        slot.outcome = None;
        slot.generation += 1;
        trace!(generation = slot.generation, "Latch reset");
    }

    /// Hand out the completion capability for the current generation.
    #[must_use]
    pub fn sink(self: &Arc<Self>) -> CompletionSink {
        let generation = self.lock().generation;
        CompletionSink {
            latch: Arc::clone(self),
            generation,
        }
    }

    /// Set the latch to `Reached` with `outcome`.
    ///
    /// Returns `false` if the latch was reset since `generation` was issued or
    /// has already been reached for it.
    fn set(&self, generation: u64, outcome: CommandOutcome) -> bool {
        {
            let mut slot = self.lock();
            if slot.generation != generation || slot.state == LatchState::Reached {
                debug!(
                    generation,
                    current = slot.generation,
                    "Dropping stale completion"
                );
                return false;
            }
            slot.state = LatchState::Reached;
            slot.outcome = Some(outcome);
            slot.reached += 1;
        }
        self.notify.notify_one();
        true
    }

    fn try_take(&self) -> Option<CommandOutcome> {
        let mut slot = self.lock();
        match slot.state {
            LatchState::Reached => slot.outcome.take(),
            LatchState::Free => None,
        }
    }

    /// Suspend until the latch is reached and take its outcome.
    ///
    /// The outcome is consumed: a second call for the same request waits for
    /// a completion that will never come. The caller resets the latch before
    /// the next request.
    pub async fn await_reached(&self) -> CommandOutcome {
        loop {
            if let Some(outcome) = self.try_take() {
                return outcome;
            }
            match self.strategy {
                WaitStrategy::Notify => self.notify.notified().await,
                WaitStrategy::Poll { interval } => tokio::time::sleep(interval).await,
            }
        }
    }
}

/// Single-use completion capability for one request.
#[derive(Debug)]
pub struct CompletionSink {
    latch: Arc<BarrierLatch>,
    generation: u64,
}

impl CompletionSink {
    /// Deliver the outcome and release the waiting routine.
    ///
    /// Returns `false` if the latch has moved on to a later request.
    pub fn complete(self, outcome: CommandOutcome) -> bool {
        self.latch.set(self.generation, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{CommandFailure, FailureKind};
    use skyroutine_transport::CommandResponse;

    fn done(text: &str) -> CommandOutcome {
        CommandOutcome::Completed(CommandResponse::ok(text))
    }

    #[tokio::test]
    async fn test_completion_before_wait() {
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));
        assert!(latch.sink().complete(done("airborne")));
        assert_eq!(latch.state(), LatchState::Reached);

        let outcome = latch.await_reached().await;
        assert_eq!(outcome.response_text(), "airborne");
        latch.reset();

        assert_eq!(latch.state(), LatchState::Free);
        assert_eq!(latch.reached_count(), 1);
        assert_eq!(latch.released_count(), 1);
    }

    #[tokio::test]
    async fn test_completion_from_another_task() {
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));
        let sink = latch.sink();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sink.complete(done("calibrated"));
        });

        assert_eq!(latch.await_reached().await.response_text(), "calibrated");
    }

    #[tokio::test]
    async fn test_poll_strategy() {
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Poll {
            interval: Duration::from_millis(5),
        }));
        let sink = latch.sink();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            sink.complete(CommandOutcome::Failed(CommandFailure {
                kind: FailureKind::Dispatch,
                message: "offline".to_string(),
            }));
        });

        let outcome = latch.await_reached().await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_stale_sink_rejected_after_reset() {
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));
        let stale = latch.sink();
        latch.reset();

        assert!(!stale.complete(done("late")));
        assert_eq!(latch.state(), LatchState::Free);
        assert_eq!(latch.reached_count(), 0);
    }

    #[tokio::test]
    async fn test_second_completion_same_generation_ignored() {
        let latch = Arc::new(BarrierLatch::new(WaitStrategy::Notify));
        let first = latch.sink();
        let second = latch.sink();

        assert!(first.complete(done("one")));
        assert!(!second.complete(done("two")));
        assert_eq!(latch.await_reached().await.response_text(), "one");
    }
}
