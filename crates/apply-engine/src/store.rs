//! Job-store collaborator boundary.
//!
//! Durable state (applied status, activity history) belongs entirely to the
//! store behind [`JobStore`]; the engine only requires that `mark_applied`
//! records the status update and the dedup record as one logical operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ApplyEvent;
use crate::platform::Platform;

/// Stable identifier for a job posting, e.g. `acme::staff-engineer`.
///
/// Doubles as the dedup key: one in-flight session and one submission per
/// `JobId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The slice of a discovered job the engine needs to run an apply session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: JobId,
    pub title: String,
    pub company: String,
    pub url: String,
    pub platform: Platform,
}

/// Dedup record persisted by the store when a submission succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub job_id: JobId,
    pub platform: Platform,
    pub applied_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job store backend error: {0}")]
    Backend(String),
}

/// External job store, assumed atomic per call from the engine's perspective.
pub trait JobStore: Send + Sync {
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobPosting>, StoreError>;

    /// Whether a successful submission was ever recorded for this job.
    fn is_applied(&self, job_id: &JobId, platform: &Platform) -> Result<bool, StoreError>;

    /// Record the applied status and the dedup entry as one logical write.
    fn mark_applied(&self, record: AppliedRecord) -> Result<(), StoreError>;

    fn log_activity(&self, job_id: &JobId, event: &ApplyEvent) -> Result<(), StoreError>;
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, JobPosting>,
    applied: HashMap<JobId, AppliedRecord>,
    activity: Vec<(JobId, ApplyEvent)>,
}

/// In-memory driver, used by the default service wiring and the test suites.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_job(&self, job: JobPosting) {
        self.lock().jobs.insert(job.job_id.clone(), job);
    }

    #[must_use]
    pub fn applied_record(&self, job_id: &JobId) -> Option<AppliedRecord> {
        self.lock().applied.get(job_id).cloned()
    }

    #[must_use]
    pub fn activity_for(&self, job_id: &JobId) -> Vec<ApplyEvent> {
        self.lock()
            .activity
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }
}

impl JobStore for InMemoryJobStore {
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobPosting>, StoreError> {
        Ok(self.lock().jobs.get(job_id).cloned())
    }

    fn is_applied(&self, job_id: &JobId, _platform: &Platform) -> Result<bool, StoreError> {
        // Dedup is keyed on the job id alone; the platform tag is kept on the
        // record for audit.
        Ok(self.lock().applied.contains_key(job_id))
    }

    fn mark_applied(&self, record: AppliedRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.jobs.contains_key(&record.job_id) {
            return Err(StoreError::JobNotFound(record.job_id));
        }
        inner.applied.insert(record.job_id.clone(), record);
        Ok(())
    }

    fn log_activity(&self, job_id: &JobId, event: &ApplyEvent) -> Result<(), StoreError> {
        self.lock().activity.push((job_id.clone(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ApplyEvent;

    fn posting(id: &str) -> JobPosting {
        JobPosting {
            job_id: JobId::from(id),
            title: "Staff Engineer".to_string(),
            company: "Acme".to_string(),
            url: "https://example.com/jobs/1".to_string(),
            platform: Platform::LinkedIn,
        }
    }

    #[test]
    fn mark_applied_requires_a_known_job() {
        let store = InMemoryJobStore::new();
        let record = AppliedRecord {
            job_id: JobId::from("ghost::role"),
            platform: Platform::LinkedIn,
            applied_at: Utc::now(),
            metadata: serde_json::json!({}),
        };
        assert!(matches!(
            store.mark_applied(record),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn applied_status_round_trips() {
        let store = InMemoryJobStore::new();
        store.insert_job(posting("acme::staff-engineer"));
        let job_id = JobId::from("acme::staff-engineer");

        assert!(!store.is_applied(&job_id, &Platform::LinkedIn).unwrap_or(true));
        store
            .mark_applied(AppliedRecord {
                job_id: job_id.clone(),
                platform: Platform::LinkedIn,
                applied_at: Utc::now(),
                metadata: serde_json::json!({"mode": "semi_auto"}),
            })
            .ok();
        assert!(store.is_applied(&job_id, &Platform::LinkedIn).unwrap_or(false));
        assert!(store.applied_record(&job_id).is_some());
    }

    #[test]
    fn activity_log_is_scoped_per_job() {
        let store = InMemoryJobStore::new();
        let a = JobId::from("a::1");
        let b = JobId::from("b::2");
        store.log_activity(&a, &ApplyEvent::progress("navigating")).ok();
        store.log_activity(&b, &ApplyEvent::progress("filling form")).ok();
        assert_eq!(store.activity_for(&a).len(), 1);
        assert_eq!(store.activity_for(&b).len(), 1);
    }
}
