//! Process-wide session registry: job id to active session, at most one
//! in-flight attempt per job.
//!
//! All operations take the single registry mutex for their whole critical
//! section, so "no two sessions for the same job" holds even under
//! concurrent trigger requests. The lock is never held across an await.
//! The registry is in-memory and ephemeral; sessions do not survive a
//! process restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::debug;

use crate::bridge::EventReceiver;
use crate::error::ApplyError;
use crate::gate::ConfirmationGate;
use crate::session::ApplySession;
use crate::store::JobId;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<JobId, ApplySession>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, ApplySession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new session; fails if one is already live for the job.
    ///
    /// A session whose worker already reached a terminal phase but whose
    /// stream was never claimed has no drop path left to remove it, so a
    /// fresh trigger evicts it here instead of conflicting forever.
    pub fn register(&self, session: ApplySession) -> Result<(), ApplyError> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&session.job_id) {
            let abandoned = existing.phase().is_terminal() && existing.receiver.is_some();
            if !abandoned {
                return Err(ApplyError::AlreadyInProgress(session.job_id.clone()));
            }
            debug!(
                job_id = %session.job_id,
                session_id = %existing.session_id,
                "evicting finished session with an unclaimed stream"
            );
        }
        sessions.insert(session.job_id.clone(), session);
        Ok(())
    }

    pub(crate) fn attach_worker(&self, job_id: &JobId, handle: JoinHandle<()>) {
        if let Some(session) = self.lock().get_mut(job_id) {
            session.worker = Some(handle);
        }
    }

    /// Take the event receiver out of a session; each session's stream can
    /// be opened once.
    pub(crate) fn claim_receiver(&self, job_id: &JobId) -> Result<EventReceiver, ApplyError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(job_id)
            .ok_or_else(|| ApplyError::SessionNotFound(job_id.clone()))?;
        session
            .receiver
            .take()
            .ok_or_else(|| ApplyError::StreamAlreadyOpen(job_id.clone()))
    }

    #[must_use]
    pub(crate) fn gate(&self, job_id: &JobId) -> Option<Arc<ConfirmationGate>> {
        self.lock().get(job_id).map(|session| Arc::clone(&session.gate))
    }

    pub fn remove(&self, job_id: &JobId) -> Option<ApplySession> {
        self.lock().remove(job_id)
    }

    #[must_use]
    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::bridge::event_channel;
    use crate::events::ApplyMode;
    use crate::session::{PhaseCell, SessionPhase};

    fn session(job_id: &str) -> ApplySession {
        let (_tx, rx) = event_channel(4);
        ApplySession::new(
            JobId::from(job_id),
            ApplyMode::SemiAuto,
            Arc::new(ConfirmationGate::new()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PhaseCell::new()),
            rx,
        )
    }

    #[test]
    fn second_registration_for_same_job_is_rejected() {
        let registry = SessionRegistry::new();
        assert!(registry.register(session("acme::staff-engineer")).is_ok());
        assert!(matches!(
            registry.register(session("acme::staff-engineer")),
            Err(ApplyError::AlreadyInProgress(_))
        ));
        assert_eq!(registry.active(), 1);
    }

    #[test]
    fn concurrent_registration_admits_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let mut workers = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            workers.push(std::thread::spawn(move || {
                registry.register(session("acme::staff-engineer")).is_ok()
            }));
        }
        let admitted = workers
            .into_iter()
            .map(|handle| handle.join())
            .filter(|result| matches!(result, Ok(true)))
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn removal_frees_the_job_id() {
        let registry = SessionRegistry::new();
        registry.register(session("acme::staff-engineer")).ok();
        assert!(registry.remove(&JobId::from("acme::staff-engineer")).is_some());
        assert!(!registry.contains(&JobId::from("acme::staff-engineer")));
        assert!(registry.register(session("acme::staff-engineer")).is_ok());
    }

    #[test]
    fn receiver_can_be_claimed_once() {
        let registry = SessionRegistry::new();
        registry.register(session("acme::staff-engineer")).ok();
        let job_id = JobId::from("acme::staff-engineer");
        assert!(registry.claim_receiver(&job_id).is_ok());
        assert!(matches!(
            registry.claim_receiver(&job_id),
            Err(ApplyError::StreamAlreadyOpen(_))
        ));
        assert!(matches!(
            registry.claim_receiver(&JobId::from("ghost::role")),
            Err(ApplyError::SessionNotFound(_))
        ));
    }

    #[test]
    fn finished_session_with_an_unclaimed_stream_is_evicted_on_register() {
        let registry = SessionRegistry::new();
        let stale = session("acme::staff-engineer");
        stale.phase.advance(SessionPhase::Checking).ok();
        stale.phase.advance(SessionPhase::AlreadyApplied).ok();
        registry.register(stale).ok();

        assert!(registry.register(session("acme::staff-engineer")).is_ok());
        assert_eq!(registry.active(), 1);
    }

    #[test]
    fn finished_session_with_a_claimed_stream_still_blocks_registration() {
        let registry = SessionRegistry::new();
        let stale = session("acme::staff-engineer");
        let phase = Arc::clone(&stale.phase);
        registry.register(stale).ok();
        // A claimed receiver means a stream exists whose drop path owns the
        // removal; registration must keep failing until it runs.
        registry
            .claim_receiver(&JobId::from("acme::staff-engineer"))
            .ok();
        phase.advance(SessionPhase::Checking).ok();
        phase.advance(SessionPhase::Cancelled).ok();

        assert!(matches!(
            registry.register(session("acme::staff-engineer")),
            Err(ApplyError::AlreadyInProgress(_))
        ));
    }

    #[test]
    fn gate_lookup_reaches_the_registered_session() {
        let registry = SessionRegistry::new();
        registry.register(session("acme::staff-engineer")).ok();
        assert!(registry.gate(&JobId::from("acme::staff-engineer")).is_some());
        assert!(registry.gate(&JobId::from("ghost::role")).is_none());
    }
}
