//! Progress-event data model and the legal-path checker.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::FilledSummary;
use crate::store::{JobId, JobPosting};

/// How much pre-confirmation automation a session attempts.
///
/// The mode never controls the confirmation gate itself: human approval
/// before final submission is mandatory in every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    FullAuto,
    SemiAuto,
    EasyApplyOnly,
}

impl ApplyMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullAuto => "full_auto",
            Self::SemiAuto => "semi_auto",
            Self::EasyApplyOnly => "easy_apply_only",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyEventType {
    Started,
    Progress,
    FormFilled,
    ConfirmationNeeded,
    Submitted,
    AlreadyApplied,
    Cancelled,
    Error,
    Done,
}

impl ApplyEventType {
    /// Exactly one terminal event closes every session; nothing may follow it.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AlreadyApplied | Self::Cancelled | Self::Error | Self::Done
        )
    }

    /// Lowercase name used for the server-push event field.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::FormFilled => "form_filled",
            Self::ConfirmationNeeded => "confirmation_needed",
            Self::Submitted => "submitted",
            Self::AlreadyApplied => "already_applied",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ApplyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One progress envelope as delivered to the remote client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEvent {
    #[serde(rename = "type")]
    pub event_type: ApplyEventType,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ApplyEvent {
    #[must_use]
    pub fn new(
        event_type: ApplyEventType,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            message: message.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn started(job: &JobPosting, mode: ApplyMode) -> Self {
        Self::new(
            ApplyEventType::Started,
            format!("starting apply for {} at {}", job.title, job.company),
            serde_json::json!({
                "job_id": job.job_id,
                "platform": job.platform,
                "mode": mode,
            }),
        )
    }

    #[must_use]
    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(ApplyEventType::Progress, message, serde_json::Value::Null)
    }

    #[must_use]
    pub fn progress_with(message: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self::new(ApplyEventType::Progress, message, metadata)
    }

    #[must_use]
    pub fn form_filled(summary: &FilledSummary) -> Self {
        Self::new(
            ApplyEventType::FormFilled,
            format!(
                "filled {} fields ({} skipped)",
                summary.filled.len(),
                summary.skipped.len()
            ),
            serde_json::json!({
                "filled": summary.filled,
                "skipped": summary.skipped,
            }),
        )
    }

    #[must_use]
    pub fn confirmation_needed(timeout: Duration) -> Self {
        Self::new(
            ApplyEventType::ConfirmationNeeded,
            "review the filled form and confirm or cancel the submission",
            serde_json::json!({ "timeout_seconds": timeout.as_secs() }),
        )
    }

    #[must_use]
    pub fn submitted(job_id: &JobId) -> Self {
        Self::new(
            ApplyEventType::Submitted,
            "application submitted",
            serde_json::json!({ "job_id": job_id }),
        )
    }

    #[must_use]
    pub fn already_applied(job_id: &JobId) -> Self {
        Self::new(
            ApplyEventType::AlreadyApplied,
            format!("job {job_id} was already applied to; nothing to do"),
            serde_json::json!({ "job_id": job_id }),
        )
    }

    #[must_use]
    pub fn cancelled(message: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self::new(ApplyEventType::Cancelled, message, metadata)
    }

    #[must_use]
    pub fn error(step: &'static str, message: impl Into<String>, metadata: serde_json::Value) -> Self {
        let mut metadata = metadata;
        if let serde_json::Value::Object(map) = &mut metadata {
            map.insert("step".to_string(), serde_json::Value::String(step.to_string()));
        }
        Self::new(ApplyEventType::Error, message, metadata)
    }

    #[must_use]
    pub fn done(job_id: &JobId) -> Self {
        Self::new(
            ApplyEventType::Done,
            "apply session complete",
            serde_json::json!({ "job_id": job_id }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventPathError {
    #[error("event path is empty")]
    Empty,
    #[error("{0} is not a legal first event")]
    BadStart(ApplyEventType),
    #[error("{next} may not follow {prev}")]
    IllegalFollow {
        prev: ApplyEventType,
        next: ApplyEventType,
    },
    #[error("{0} observed after a terminal event")]
    AfterTerminal(ApplyEventType),
    #[error("path does not end in a terminal event")]
    MissingTerminal,
}

fn may_follow(prev: ApplyEventType, next: ApplyEventType) -> bool {
    use ApplyEventType as E;
    if prev.is_terminal() {
        return false;
    }
    // Cancellation checkpoints and step-boundary errors are reachable from
    // every non-terminal state.
    if matches!(next, E::Cancelled | E::Error) {
        return true;
    }
    matches!(
        (prev, next),
        (E::Started, E::Progress | E::FormFilled)
            | (E::Progress, E::Progress | E::FormFilled)
            | (E::FormFilled, E::ConfirmationNeeded)
            | (E::ConfirmationNeeded, E::Submitted)
            | (E::Submitted, E::Done)
    )
}

/// Validate that an observed event sequence is a legal walk through the
/// session state machine, ending in exactly one terminal event.
pub fn check_event_path(path: &[ApplyEventType]) -> Result<(), EventPathError> {
    let Some(first) = path.first() else {
        return Err(EventPathError::Empty);
    };
    if !matches!(*first, ApplyEventType::Started | ApplyEventType::AlreadyApplied) {
        return Err(EventPathError::BadStart(*first));
    }
    for pair in path.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if prev.is_terminal() {
            return Err(EventPathError::AfterTerminal(next));
        }
        if !may_follow(prev, next) {
            return Err(EventPathError::IllegalFollow { prev, next });
        }
    }
    match path.last() {
        Some(last) if last.is_terminal() => Ok(()),
        _ => Err(EventPathError::MissingTerminal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplyEventType as E;

    #[test]
    fn happy_path_is_legal() {
        let path = [
            E::Started,
            E::Progress,
            E::Progress,
            E::FormFilled,
            E::ConfirmationNeeded,
            E::Submitted,
            E::Done,
        ];
        assert_eq!(check_event_path(&path), Ok(()));
    }

    #[test]
    fn already_applied_short_circuit_is_legal() {
        assert_eq!(check_event_path(&[E::AlreadyApplied]), Ok(()));
    }

    #[test]
    fn cancel_is_reachable_from_any_non_terminal() {
        assert_eq!(check_event_path(&[E::Started, E::Cancelled]), Ok(()));
        assert_eq!(
            check_event_path(&[
                E::Started,
                E::Progress,
                E::FormFilled,
                E::ConfirmationNeeded,
                E::Cancelled
            ]),
            Ok(())
        );
    }

    #[test]
    fn nothing_follows_a_terminal_event() {
        assert_eq!(
            check_event_path(&[E::Started, E::Cancelled, E::Done]),
            Err(EventPathError::AfterTerminal(E::Done))
        );
    }

    #[test]
    fn submission_requires_confirmation_first() {
        assert_eq!(
            check_event_path(&[E::Started, E::Submitted, E::Done]),
            Err(EventPathError::IllegalFollow {
                prev: E::Started,
                next: E::Submitted
            })
        );
    }

    #[test]
    fn unterminated_paths_are_rejected() {
        assert_eq!(
            check_event_path(&[E::Started, E::Progress]),
            Err(EventPathError::MissingTerminal)
        );
    }

    #[test]
    fn event_type_wire_names_are_stable() {
        assert_eq!(E::ConfirmationNeeded.wire_name(), "confirmation_needed");
        let json = serde_json::to_string(&E::FormFilled).unwrap_or_default();
        assert_eq!(json, "\"FORM_FILLED\"");
    }
}
