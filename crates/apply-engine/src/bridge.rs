//! Event bridge between the blocking worker thread and the async streamer.
//!
//! Single producer, single consumer, bounded. Progress events use a
//! non-blocking put and are dropped under extreme backpressure; the terminal
//! event is retried on a bounded schedule so it is always attempted last
//! without ever parking the worker forever behind a consumer that stopped
//! draining.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::ApplyEvent;

const TERMINAL_SEND_ATTEMPTS: u32 = 200;
const TERMINAL_SEND_RETRY_DELAY: Duration = Duration::from_millis(25);

pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { rx, dropped },
    )
}

/// Worker-thread side of the bridge. All methods are safe to call from a
/// blocking context only.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ApplyEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    pub fn emit(&self, event: ApplyEvent) {
        if event.event_type.is_terminal() {
            self.emit_terminal(event);
        } else {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = %event.event_type,
                        "event queue full; dropping progress event"
                    );
                }
                Err(TrySendError::Closed(event)) => {
                    debug!(
                        event_type = %event.event_type,
                        "event consumer gone; discarding event"
                    );
                }
            }
        }
    }

    fn emit_terminal(&self, mut event: ApplyEvent) {
        for _ in 0..TERMINAL_SEND_ATTEMPTS {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    std::thread::sleep(TERMINAL_SEND_RETRY_DELAY);
                }
                Err(TrySendError::Closed(back)) => {
                    debug!(
                        event_type = %back.event_type,
                        "event consumer gone before terminal event"
                    );
                    return;
                }
            }
        }
        warn!(
            event_type = %event.event_type,
            "gave up delivering terminal event to a consumer that stopped draining"
        );
    }
}

/// Streamer side of the bridge.
pub struct EventReceiver {
    rx: mpsc::Receiver<ApplyEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<ApplyEvent> {
        self.rx.recv().await
    }

    /// How many progress events were discarded under backpressure.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
