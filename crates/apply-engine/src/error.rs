//! Engine-level error taxonomy.
//!
//! Failures inside the worker never surface as errors across the thread
//! boundary; they are converted to a terminal ERROR event at the step where
//! they happened. The variants here are what the trigger/confirm/stream
//! operations can return to their caller.

use std::time::Duration;

use thiserror::Error;

use crate::session::PhaseError;
use crate::store::{JobId, StoreError};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("an apply session is already in progress for job {0}")]
    AlreadyInProgress(JobId),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("no active apply session for job {0}")]
    SessionNotFound(JobId),
    #[error("job {0} was already applied to")]
    AlreadyApplied(JobId),
    #[error("automation failure at {step}: {message}")]
    Automation { step: &'static str, message: String },
    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),
    #[error("submission failed: {0}")]
    Submission(String),
    #[error("progress stream already open for job {0}")]
    StreamAlreadyOpen(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PhaseError> for ApplyError {
    fn from(error: PhaseError) -> Self {
        Self::Internal(error.to_string())
    }
}
