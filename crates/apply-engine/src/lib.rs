#![forbid(unsafe_code)]

//! Apply-session orchestration for one-click job applications.
//!
//! The engine owns the full lifecycle of an apply attempt: a mutex-guarded
//! session registry (at most one in-flight attempt per job), a dedicated
//! blocking worker thread per session driving a [`platform::PlatformAdapter`],
//! a bounded event bridge between the worker thread and the async side, and a
//! mandatory human confirmation gate before any submission. Progress is
//! consumed through [`stream::SessionStream`], whose drop path frees the
//! job id once a stream has been opened; a finished session whose stream
//! was never claimed is evicted by the registry on the next trigger.
//!
//! Total concurrent sessions across distinct jobs is not capped here; a
//! deployment that needs a global worker-thread limit has to enforce it
//! outside the engine.

pub mod bridge;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod platform;
pub mod profile;
pub mod registry;
pub mod session;
pub mod store;
pub mod stream;
pub mod test_support;
mod worker;

pub use engine::{ApplyEngine, EngineSettings, TriggerReceipt};
pub use error::ApplyError;
pub use events::{ApplyEvent, ApplyEventType, ApplyMode};
pub use gate::{ConfirmDecision, ConfirmationGate, GateOutcome};
pub use platform::{
    AdapterFactory, AtsProvider, FilledSummary, Platform, PlatformAdapter, PlatformCapabilities,
    PlatformError,
};
pub use profile::{FieldMap, ProfileSource, StaticProfile};
pub use store::{AppliedRecord, InMemoryJobStore, JobId, JobPosting, JobStore, StoreError};
pub use stream::{SessionStream, StreamItem};
