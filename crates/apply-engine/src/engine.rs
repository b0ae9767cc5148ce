//! Engine facade: trigger, stream, confirm.
//!
//! [`ApplyEngine`] owns the session registry and wires every trigger into a
//! dedicated worker thread. The three operations are independent entry
//! points so a remote client can fire-and-stream: `trigger` returns as soon
//! as the worker is spawned, `open_stream` claims the session's event
//! receiver, and `confirm` flips the human-in-the-loop gate.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::event_channel;
use crate::error::ApplyError;
use crate::events::ApplyMode;
use crate::gate::{ConfirmDecision, ConfirmationGate};
use crate::platform::AdapterFactory;
use crate::profile::ProfileSource;
use crate::registry::SessionRegistry;
use crate::session::{ApplySession, PhaseCell};
use crate::store::{JobId, JobStore};
use crate::stream::SessionStream;
use crate::worker::{self, WorkerContext};

/// Engine-wide tunables. The defaults match an interactive client: a long
/// confirmation window and a heartbeat short enough to keep idle proxies
/// from closing the stream.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub confirmation_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(15),
            queue_capacity: 64,
        }
    }
}

/// Returned by a successful trigger; everything a client needs to follow
/// the session it just started.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerReceipt {
    pub session_id: Uuid,
    pub job_id: JobId,
    pub mode: ApplyMode,
    pub created_at: DateTime<Utc>,
}

pub struct ApplyEngine {
    store: Arc<dyn JobStore>,
    adapters: Arc<dyn AdapterFactory>,
    profile: Arc<dyn ProfileSource>,
    registry: Arc<SessionRegistry>,
    settings: EngineSettings,
}

impl ApplyEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        adapters: Arc<dyn AdapterFactory>,
        profile: Arc<dyn ProfileSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            adapters,
            profile,
            registry: Arc::new(SessionRegistry::new()),
            settings,
        }
    }

    /// Start an apply session for a known job. Fails fast when the job does
    /// not exist or a session for it is already live; the dedup check
    /// against past submissions happens on the worker thread and surfaces
    /// as an ALREADY_APPLIED event on the stream.
    pub fn trigger(&self, job_id: &JobId, mode: ApplyMode) -> Result<TriggerReceipt, ApplyError> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| ApplyError::JobNotFound(job_id.clone()))?;

        let (events, receiver) = event_channel(self.settings.queue_capacity);
        let gate = Arc::new(ConfirmationGate::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let phase = Arc::new(PhaseCell::new());
        let session = ApplySession::new(
            job_id.clone(),
            mode,
            Arc::clone(&gate),
            Arc::clone(&cancel),
            Arc::clone(&phase),
            receiver,
        );
        let receipt = TriggerReceipt {
            session_id: session.session_id,
            job_id: job_id.clone(),
            mode,
            created_at: session.created_at,
        };

        // Registration before spawn: the job id is reserved atomically, and
        // a spawn failure unwinds by removing the reservation.
        self.registry.register(session)?;

        let ctx = WorkerContext {
            job,
            mode,
            session_id: receipt.session_id,
            store: Arc::clone(&self.store),
            adapters: Arc::clone(&self.adapters),
            profile: Arc::clone(&self.profile),
            gate,
            cancel,
            phase,
            events,
            confirmation_timeout: self.settings.confirmation_timeout,
        };
        let spawned = std::thread::Builder::new()
            .name(format!("apply-{job_id}"))
            .spawn(move || worker::run(ctx));
        match spawned {
            Ok(handle) => self.registry.attach_worker(job_id, handle),
            Err(error) => {
                self.registry.remove(job_id);
                warn!(job_id = %job_id, %error, "failed to spawn apply worker");
                return Err(ApplyError::Internal(format!(
                    "failed to spawn apply worker: {error}"
                )));
            }
        }

        info!(
            job_id = %job_id,
            session_id = %receipt.session_id,
            mode = %mode,
            "apply session triggered"
        );
        Ok(receipt)
    }

    /// Claim the session's progress stream. Each session's stream can be
    /// opened exactly once; dropping it cancels the session.
    pub fn open_stream(&self, job_id: &JobId) -> Result<SessionStream, ApplyError> {
        let receiver = self.registry.claim_receiver(job_id)?;
        Ok(SessionStream::new(
            job_id.clone(),
            receiver,
            self.settings.heartbeat_interval,
            Arc::clone(&self.registry),
        ))
    }

    /// Resolve the confirmation gate for a live session. Returns whether
    /// this call decided the gate (`false` when a decision was already in).
    pub fn confirm(&self, job_id: &JobId, decision: ConfirmDecision) -> Result<bool, ApplyError> {
        let gate = self
            .registry
            .gate(job_id)
            .ok_or_else(|| ApplyError::SessionNotFound(job_id.clone()))?;
        let decided = gate.signal(decision);
        info!(job_id = %job_id, ?decision, decided, "confirmation received");
        Ok(decided)
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.registry.active()
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}
