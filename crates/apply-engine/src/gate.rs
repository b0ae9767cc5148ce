//! One-shot confirmation gate between the async trigger side and the
//! blocking worker thread.
//!
//! This is the only synchronization point between the two scheduling models
//! besides the event bridge. The first `signal` wins; later signals are
//! observable no-ops. A timed-out `wait` is treated by callers exactly like
//! an explicit cancel.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmDecision {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Confirmed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Default)]
pub struct ConfirmationGate {
    decision: Mutex<Option<ConfirmDecision>>,
    signaled: Condvar,
}

impl ConfirmationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision. Returns `true` if this call decided the gate,
    /// `false` if a decision was already in place (no-op).
    pub fn signal(&self, decision: ConfirmDecision) -> bool {
        let mut slot = self
            .decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(decision);
        self.signaled.notify_all();
        true
    }

    /// Block the calling thread until a decision lands or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> GateOutcome {
        let guard = self
            .decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _timed_out) = self
            .signaled
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(ConfirmDecision::Confirm) => GateOutcome::Confirmed,
            Some(ConfirmDecision::Cancel) => GateOutcome::Cancelled,
            None => GateOutcome::TimedOut,
        }
    }

    /// Non-blocking view of the current decision, if any.
    #[must_use]
    pub fn decision(&self) -> Option<ConfirmDecision> {
        *self
            .decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
