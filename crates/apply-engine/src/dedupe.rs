//! Already-applied guard over the job store.
//!
//! Prevents duplicate submissions across separate process runs (the registry
//! only covers in-process concurrency). A job is recorded as applied if and
//! only if the worker reached SUBMITTED after an explicit human confirmation.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::platform::Platform;
use crate::store::{AppliedRecord, JobId, JobStore, StoreError};

pub struct AppliedGuard {
    store: Arc<dyn JobStore>,
}

impl AppliedGuard {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn is_applied(&self, job_id: &JobId, platform: &Platform) -> Result<bool, StoreError> {
        self.store.is_applied(job_id, platform)
    }

    /// Persist the dedup record plus status update in one store call.
    /// Only called after a confirmed, successful submission.
    pub fn record(
        &self,
        job_id: &JobId,
        platform: &Platform,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.store.mark_applied(AppliedRecord {
            job_id: job_id.clone(),
            platform: platform.clone(),
            applied_at: Utc::now(),
            metadata,
        })?;
        info!(job_id = %job_id, platform = %platform, "job marked as applied");
        Ok(())
    }
}
