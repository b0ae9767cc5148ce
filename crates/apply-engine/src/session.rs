//! Per-session lifecycle state machine and the session record owned by the
//! registry.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::bridge::EventReceiver;
use crate::events::ApplyMode;
use crate::gate::ConfirmationGate;
use crate::store::JobId;

/// One-directional session lifecycle. A session that reaches a terminal
/// phase is never resumed; a new trigger creates an entirely new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Checking,
    Automating,
    AwaitingConfirmation,
    Submitting,
    Done,
    Cancelled,
    Error,
    AlreadyApplied,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Cancelled | Self::Error | Self::AlreadyApplied
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Automating => "automating",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::AlreadyApplied => "already_applied",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal session phase transition {from} -> {to}")]
pub struct PhaseError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

#[must_use]
pub fn may_transition(from: SessionPhase, to: SessionPhase) -> bool {
    use SessionPhase as P;
    if from.is_terminal() {
        return false;
    }
    // Cancellation checkpoints and step-boundary failures can close a
    // session from any live phase.
    if matches!(to, P::Cancelled | P::Error) {
        return true;
    }
    matches!(
        (from, to),
        (P::Idle, P::Checking)
            | (P::Checking, P::Automating | P::AlreadyApplied)
            | (P::Automating, P::AwaitingConfirmation)
            | (P::AwaitingConfirmation, P::Submitting)
            | (P::Submitting, P::Done)
    )
}

/// Mutex-guarded phase holder shared between the worker and observers.
#[derive(Debug)]
pub struct PhaseCell {
    phase: Mutex<SessionPhase>,
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self {
            phase: Mutex::new(SessionPhase::Idle),
        }
    }
}

impl PhaseCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance(&self, to: SessionPhase) -> Result<(), PhaseError> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if !may_transition(*phase, to) {
            return Err(PhaseError { from: *phase, to });
        }
        *phase = to;
        Ok(())
    }
}

/// Authoritative state of one apply attempt, owned by the registry for the
/// session's whole lifetime. The worker holds only the shared handles
/// (`gate`, `cancel`, `phase`), never a second copy of this record.
pub struct ApplySession {
    pub session_id: Uuid,
    pub job_id: JobId,
    pub mode: ApplyMode,
    pub created_at: DateTime<Utc>,
    pub(crate) gate: Arc<ConfirmationGate>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) phase: Arc<PhaseCell>,
    pub(crate) receiver: Option<EventReceiver>,
    pub(crate) worker: Option<JoinHandle<()>>,
}

impl ApplySession {
    #[must_use]
    pub(crate) fn new(
        job_id: JobId,
        mode: ApplyMode,
        gate: Arc<ConfirmationGate>,
        cancel: Arc<AtomicBool>,
        phase: Arc<PhaseCell>,
        receiver: EventReceiver,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            job_id,
            mode,
            created_at: Utc::now(),
            gate,
            cancel,
            phase,
            receiver: Some(receiver),
            worker: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.current()
    }
}
