//! Consumer-side event streaming with guaranteed cleanup.
//!
//! [`SessionStream`] is the cooperative-scheduler half of the bridge: it
//! yields worker events in emission order, emits a heartbeat whenever the
//! queue stays idle for the heartbeat interval, and ends after the first
//! terminal event. Dropping the stream (client disconnect included) runs the
//! cleanup guard: the session leaves the registry, the cancel flag is set,
//! and the gate is cancelled. That drop path frees the job id for every
//! session whose stream was opened; a finished session that never had its
//! stream claimed is evicted by the registry on the next trigger instead.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::bridge::EventReceiver;
use crate::events::ApplyEvent;
use crate::gate::ConfirmDecision;
use crate::registry::SessionRegistry;
use crate::store::JobId;

#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(ApplyEvent),
    /// Emitted when no event arrived within the heartbeat interval, so the
    /// transport can keep the connection alive.
    Heartbeat,
}

/// Removes the session on drop; best-effort cancellation of the worker.
///
/// The worker thread is deliberately not joined here: it observes the cancel
/// flag at its next step boundary and a blocking platform call already in
/// flight runs to its own timeout.
pub(crate) struct CleanupGuard {
    job_id: JobId,
    registry: Arc<SessionRegistry>,
}

impl CleanupGuard {
    pub(crate) fn new(job_id: JobId, registry: Arc<SessionRegistry>) -> Self {
        Self { job_id, registry }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(session) = self.registry.remove(&self.job_id) else {
            return;
        };
        session.cancel.store(true, Ordering::SeqCst);
        let decided_now = session.gate.signal(ConfirmDecision::Cancel);
        debug!(
            job_id = %self.job_id,
            session_id = %session.session_id,
            cancelled_worker = decided_now,
            "apply session removed from registry"
        );
    }
}

struct StreamState {
    receiver: EventReceiver,
    heartbeat: Duration,
    finished: bool,
    job_id: JobId,
    _cleanup: CleanupGuard,
}

pub struct SessionStream {
    inner: Pin<Box<dyn Stream<Item = StreamItem> + Send>>,
}

impl SessionStream {
    pub(crate) fn new(
        job_id: JobId,
        receiver: EventReceiver,
        heartbeat: Duration,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let state = StreamState {
            receiver,
            heartbeat,
            finished: false,
            job_id: job_id.clone(),
            _cleanup: CleanupGuard::new(job_id, registry),
        };
        let inner = stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            match tokio::time::timeout(state.heartbeat, state.receiver.recv()).await {
                Ok(Some(event)) => {
                    if event.event_type.is_terminal() {
                        state.finished = true;
                        let dropped = state.receiver.dropped_events();
                        if dropped > 0 {
                            debug!(
                                job_id = %state.job_id,
                                dropped,
                                "progress events were dropped under backpressure"
                            );
                        }
                    }
                    Some((StreamItem::Event(event), state))
                }
                // Worker side gone without a terminal event; end the stream
                // and let the guard clean up.
                Ok(None) => None,
                Err(_) => Some((StreamItem::Heartbeat, state)),
            }
        });
        Self {
            inner: inner.boxed(),
        }
    }

    /// Collect events (heartbeats skipped) until the stream ends.
    pub async fn collect_events(self) -> Vec<ApplyEvent> {
        self.filter_map(|item| async move {
            match item {
                StreamItem::Event(event) => Some(event),
                StreamItem::Heartbeat => None,
            }
        })
        .collect()
        .await
    }
}

impl Stream for SessionStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::bridge::event_channel;
    use crate::events::ApplyMode;
    use crate::gate::ConfirmationGate;
    use crate::session::{ApplySession, PhaseCell};

    fn registered(registry: &Arc<SessionRegistry>, job_id: &str) -> crate::bridge::EventSender {
        let (tx, rx) = event_channel(8);
        let session = ApplySession::new(
            JobId::from(job_id),
            ApplyMode::FullAuto,
            Arc::new(ConfirmationGate::new()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PhaseCell::new()),
            rx,
        );
        registry.register(session).ok();
        tx
    }

    #[tokio::test]
    async fn stream_ends_at_terminal_event_and_frees_the_job() {
        let registry = Arc::new(SessionRegistry::new());
        let tx = registered(&registry, "acme::staff-engineer");
        let job_id = JobId::from("acme::staff-engineer");

        let receiver = registry
            .claim_receiver(&job_id)
            .ok()
            .map(|receiver| {
                SessionStream::new(
                    job_id.clone(),
                    receiver,
                    Duration::from_secs(15),
                    Arc::clone(&registry),
                )
            });
        let Some(stream) = receiver else {
            unreachable!("receiver must be claimable for a registered session");
        };

        tx.emit(ApplyEvent::progress("navigating"));
        tx.emit(ApplyEvent::done(&job_id));
        tx.emit(ApplyEvent::progress("must never be seen"));

        let events = stream.collect_events().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].event_type.is_terminal());
        assert!(!registry.contains(&job_id));
    }

    #[tokio::test]
    async fn idle_stream_yields_heartbeats() {
        let registry = Arc::new(SessionRegistry::new());
        let _tx = registered(&registry, "acme::staff-engineer");
        let job_id = JobId::from("acme::staff-engineer");
        let Ok(receiver) = registry.claim_receiver(&job_id) else {
            unreachable!("receiver must be claimable");
        };
        let mut stream = SessionStream::new(
            job_id,
            receiver,
            Duration::from_millis(10),
            Arc::clone(&registry),
        );
        let item = stream.next().await;
        assert!(matches!(item, Some(StreamItem::Heartbeat)));
    }

    #[tokio::test]
    async fn dropping_the_stream_cleans_up_and_cancels() {
        let registry = Arc::new(SessionRegistry::new());
        let _tx = registered(&registry, "acme::staff-engineer");
        let job_id = JobId::from("acme::staff-engineer");

        let gate = registry.gate(&job_id);
        let Ok(receiver) = registry.claim_receiver(&job_id) else {
            unreachable!("receiver must be claimable");
        };
        let stream = SessionStream::new(
            job_id.clone(),
            receiver,
            Duration::from_secs(15),
            Arc::clone(&registry),
        );
        drop(stream);

        assert!(!registry.contains(&job_id));
        // The guard cancelled the gate, so a worker blocked on it would wake.
        assert_eq!(
            gate.and_then(|gate| gate.decision()),
            Some(ConfirmDecision::Cancel)
        );
    }
}
