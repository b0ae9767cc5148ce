//! Dedicated worker thread for one apply session.
//!
//! Every platform-adapter call is blocking, so the whole step sequence runs
//! on its own thread and talks back to the async side exclusively through
//! the event bridge and the confirmation gate. Failures are converted to a
//! terminal ERROR event at the step where they happened; nothing unwinds
//! across the thread boundary. Cancellation is best-effort: the cancel flag
//! is observed at step boundaries, and a blocking adapter call already in
//! flight runs to its own timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bridge::EventSender;
use crate::dedupe::AppliedGuard;
use crate::error::ApplyError;
use crate::events::{ApplyEvent, ApplyMode};
use crate::gate::{ConfirmationGate, GateOutcome};
use crate::platform::{AdapterFactory, PlatformAdapter, PlatformError};
use crate::profile::ProfileSource;
use crate::session::{PhaseCell, SessionPhase};
use crate::store::{JobPosting, JobStore};

pub(crate) struct WorkerContext {
    pub job: JobPosting,
    pub mode: ApplyMode,
    pub session_id: uuid::Uuid,
    pub store: Arc<dyn JobStore>,
    pub adapters: Arc<dyn AdapterFactory>,
    pub profile: Arc<dyn ProfileSource>,
    pub gate: Arc<ConfirmationGate>,
    pub cancel: Arc<AtomicBool>,
    pub phase: Arc<PhaseCell>,
    pub events: EventSender,
    pub confirmation_timeout: Duration,
}

struct StepFailure {
    step: &'static str,
    error: ApplyError,
}

impl StepFailure {
    fn automation(step: &'static str, error: PlatformError) -> Self {
        Self {
            step,
            error: ApplyError::Automation {
                step,
                message: error.to_string(),
            },
        }
    }

    fn internal(step: &'static str, error: impl Into<ApplyError>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }
}

enum DriveEnd {
    Completed,
    Cancelled,
}

pub(crate) fn run(ctx: WorkerContext) {
    let job_id = ctx.job.job_id.clone();
    info!(job_id = %job_id, mode = %ctx.mode, session_id = %ctx.session_id, "apply worker started");

    match check_applied(&ctx) {
        Ok(true) => {
            debug!(job_id = %job_id, "apply worker finished without automation");
            return;
        }
        Ok(false) => {}
        Err(failure) => {
            emit_failure(&ctx, failure);
            return;
        }
    }

    let mut adapter = match ctx.adapters.create(&ctx.job) {
        Ok(adapter) => adapter,
        Err(error) => {
            emit_failure(&ctx, StepFailure::automation("create_adapter", error));
            return;
        }
    };

    let end = drive(&ctx, adapter.as_mut());
    let context = match &end {
        Ok(DriveEnd::Completed) => "done",
        Ok(DriveEnd::Cancelled) => "cancelled",
        Err(_) => "error",
    };
    // Screenshot-then-cleanup on every exit path that had an adapter; the
    // adapter's Drop releases the browser resources.
    if let Err(error) = adapter.screenshot(context) {
        debug!(job_id = %job_id, %error, "exit screenshot failed");
    }
    drop(adapter);

    if let Err(failure) = end {
        emit_failure(&ctx, failure);
    }
    debug!(job_id = %job_id, phase = %ctx.phase.current(), "apply worker finished");
}

/// Short-circuit before any automation: if the store already has a
/// submission for this job, emit ALREADY_APPLIED and stop.
fn check_applied(ctx: &WorkerContext) -> Result<bool, StepFailure> {
    ctx.phase
        .advance(SessionPhase::Checking)
        .map_err(|error| StepFailure::internal("check_applied", error))?;
    let guard = AppliedGuard::new(Arc::clone(&ctx.store));
    let applied = guard
        .is_applied(&ctx.job.job_id, &ctx.job.platform)
        .map_err(|error| StepFailure::internal("check_applied", error))?;
    if applied {
        ctx.phase
            .advance(SessionPhase::AlreadyApplied)
            .map_err(|error| StepFailure::internal("check_applied", error))?;
        emit_and_log(ctx, ApplyEvent::already_applied(&ctx.job.job_id));
        return Ok(true);
    }
    Ok(false)
}

fn drive(ctx: &WorkerContext, adapter: &mut dyn PlatformAdapter) -> Result<DriveEnd, StepFailure> {
    emit_and_log(ctx, ApplyEvent::started(&ctx.job, ctx.mode));

    let capabilities = adapter.capabilities();
    if ctx.mode == ApplyMode::EasyApplyOnly && !capabilities.one_step_apply {
        return Err(StepFailure {
            step: "capability_check",
            error: ApplyError::Automation {
                step: "capability_check",
                message: format!(
                    "platform {} does not advertise a one-step apply flow",
                    adapter.platform()
                ),
            },
        });
    }

    ctx.phase
        .advance(SessionPhase::Automating)
        .map_err(|error| StepFailure::internal("navigate", error))?;

    if cancelled(ctx, "before navigation")? {
        return Ok(DriveEnd::Cancelled);
    }

    let logged_in = adapter
        .is_logged_in()
        .map_err(|error| StepFailure::automation("login_check", error))?;
    if !logged_in {
        return Err(StepFailure {
            step: "login_check",
            error: ApplyError::Automation {
                step: "login_check",
                message: format!("not logged in to {}", adapter.platform()),
            },
        });
    }

    emit_and_log(ctx, ApplyEvent::progress("navigating to job page"));
    adapter
        .navigate_to_job(&ctx.job.url)
        .map_err(|error| StepFailure::automation("navigate", error))?;

    // Easy-apply flows never leave the platform's native form, so iframe
    // detection is skipped entirely in that mode.
    if ctx.mode != ApplyMode::EasyApplyOnly && capabilities.ats_iframes {
        let provider = adapter
            .detect_ats_iframe()
            .map_err(|error| StepFailure::automation("detect_ats", error))?;
        if let Some(provider) = provider {
            emit_and_log(
                ctx,
                ApplyEvent::progress_with(
                    format!("detected {} application frame", provider.as_str()),
                    serde_json::json!({ "ats_provider": provider }),
                ),
            );
        }
    }

    if cancelled(ctx, "before form fill")? {
        return Ok(DriveEnd::Cancelled);
    }

    if ctx.mode == ApplyMode::SemiAuto {
        emit_and_log(
            ctx,
            ApplyEvent::progress("reviewing form fields before filling"),
        );
    }

    emit_and_log(ctx, ApplyEvent::progress("filling form"));
    let fields = ctx.profile.field_map(&ctx.job);
    let summary = adapter
        .fill_form(&fields)
        .map_err(|error| StepFailure::automation("fill_form", error))?;
    if let Err(error) = adapter.screenshot("form-filled") {
        debug!(job_id = %ctx.job.job_id, %error, "form-filled screenshot failed");
    }
    emit_and_log(ctx, ApplyEvent::form_filled(&summary));

    ctx.phase
        .advance(SessionPhase::AwaitingConfirmation)
        .map_err(|error| StepFailure::internal("confirmation", error))?;
    emit_and_log(ctx, ApplyEvent::confirmation_needed(ctx.confirmation_timeout));

    match ctx.gate.wait(ctx.confirmation_timeout) {
        GateOutcome::Confirmed => {
            if cancelled(ctx, "after confirmation")? {
                return Ok(DriveEnd::Cancelled);
            }
            submit(ctx, adapter, &summary)?;
            Ok(DriveEnd::Completed)
        }
        GateOutcome::Cancelled => {
            finish_cancelled(
                ctx,
                ApplyEvent::cancelled(
                    "apply cancelled before submission",
                    serde_json::json!({ "job_id": ctx.job.job_id }),
                ),
            )?;
            Ok(DriveEnd::Cancelled)
        }
        GateOutcome::TimedOut => {
            // A confirmation timeout is treated identically to an explicit
            // cancel.
            let cause = ApplyError::ConfirmationTimeout(ctx.confirmation_timeout);
            finish_cancelled(
                ctx,
                ApplyEvent::cancelled(
                    "confirmation window elapsed; apply cancelled",
                    serde_json::json!({
                        "job_id": ctx.job.job_id,
                        "cause": cause.to_string(),
                        "timeout_seconds": ctx.confirmation_timeout.as_secs(),
                    }),
                ),
            )?;
            Ok(DriveEnd::Cancelled)
        }
    }
}

fn submit(
    ctx: &WorkerContext,
    adapter: &mut dyn PlatformAdapter,
    summary: &crate::platform::FilledSummary,
) -> Result<(), StepFailure> {
    ctx.phase
        .advance(SessionPhase::Submitting)
        .map_err(|error| StepFailure::internal("submit", error))?;
    adapter.submit().map_err(|error| StepFailure {
        step: "submit",
        error: ApplyError::Submission(error.to_string()),
    })?;
    emit_and_log(ctx, ApplyEvent::submitted(&ctx.job.job_id));

    let guard = AppliedGuard::new(Arc::clone(&ctx.store));
    guard
        .record(
            &ctx.job.job_id,
            &ctx.job.platform,
            serde_json::json!({
                "session_id": ctx.session_id,
                "mode": ctx.mode,
                "filled_fields": summary.filled,
            }),
        )
        .map_err(|error| StepFailure::internal("record_applied", error))?;

    ctx.phase
        .advance(SessionPhase::Done)
        .map_err(|error| StepFailure::internal("submit", error))?;
    emit_and_log(ctx, ApplyEvent::done(&ctx.job.job_id));
    Ok(())
}

/// Step-boundary cancel checkpoint. Emits the terminal CANCELLED event when
/// the flag was set by the consumer-side cleanup.
fn cancelled(ctx: &WorkerContext, at: &str) -> Result<bool, StepFailure> {
    if !ctx.cancel.load(Ordering::SeqCst) {
        return Ok(false);
    }
    finish_cancelled(
        ctx,
        ApplyEvent::cancelled(
            format!("apply cancelled {at}"),
            serde_json::json!({ "job_id": ctx.job.job_id }),
        ),
    )?;
    Ok(true)
}

fn finish_cancelled(ctx: &WorkerContext, event: ApplyEvent) -> Result<(), StepFailure> {
    ctx.phase
        .advance(SessionPhase::Cancelled)
        .map_err(|error| StepFailure::internal("cancel", error))?;
    emit_and_log(ctx, event);
    Ok(())
}

fn emit_failure(ctx: &WorkerContext, failure: StepFailure) {
    warn!(
        job_id = %ctx.job.job_id,
        step = failure.step,
        error = %failure.error,
        "apply step failed"
    );
    if let Err(error) = ctx.phase.advance(SessionPhase::Error) {
        debug!(job_id = %ctx.job.job_id, %error, "phase already terminal on failure");
    }
    let metadata = serde_json::json!({
        "job_id": ctx.job.job_id,
        "platform": ctx.job.platform,
    });
    emit_and_log(
        ctx,
        ApplyEvent::error(failure.step, failure.error.to_string(), metadata),
    );
}

/// Emit to the stream and mirror into the store's activity log (best-effort).
fn emit_and_log(ctx: &WorkerContext, event: ApplyEvent) {
    if let Err(error) = ctx.store.log_activity(&ctx.job.job_id, &event) {
        debug!(job_id = %ctx.job.job_id, %error, "activity log write failed");
    }
    ctx.events.emit(event);
}
