//! Scripted adapters for exercising the engine without a browser.
//!
//! Shipped as a public module (rather than `#[cfg(test)]`) so downstream
//! crates can drive the engine end-to-end in their own tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::platform::{
    AdapterFactory, AtsProvider, FilledSummary, Platform, PlatformAdapter, PlatformCapabilities,
    PlatformError,
};
use crate::profile::FieldMap;
use crate::store::JobPosting;

/// Shared call counters and failure switches for every adapter a
/// [`ScriptedFactory`] hands out.
#[derive(Debug, Default)]
pub struct ScriptedCalls {
    pub created: AtomicUsize,
    pub navigations: AtomicUsize,
    pub fills: AtomicUsize,
    pub submits: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub fail_fill: AtomicBool,
    pub fail_submit: AtomicBool,
    pub logged_out: AtomicBool,
}

impl ScriptedCalls {
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fills(&self) -> usize {
        self.fills.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

pub struct ScriptedAdapter {
    platform: Platform,
    capabilities: PlatformCapabilities,
    ats_host: Option<String>,
    step_delay: Duration,
    calls: Arc<ScriptedCalls>,
}

impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn is_logged_in(&mut self) -> Result<bool, PlatformError> {
        Ok(!self.calls.logged_out.load(Ordering::SeqCst))
    }

    fn navigate_to_job(&mut self, _url: &str) -> Result<(), PlatformError> {
        self.calls.navigations.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.step_delay);
        Ok(())
    }

    fn detect_ats_iframe(&mut self) -> Result<Option<AtsProvider>, PlatformError> {
        Ok(self
            .ats_host
            .as_deref()
            .and_then(AtsProvider::from_host))
    }

    fn fill_form(&mut self, fields: &FieldMap) -> Result<FilledSummary, PlatformError> {
        self.calls.fills.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.step_delay);
        if self.calls.fail_fill.load(Ordering::SeqCst) {
            return Err(PlatformError::Selector("input[name=resume]".to_string()));
        }
        Ok(FilledSummary {
            filled: fields.keys().cloned().collect(),
            skipped: Vec::new(),
        })
    }

    fn submit(&mut self) -> Result<(), PlatformError> {
        self.calls.submits.fetch_add(1, Ordering::SeqCst);
        if self.calls.fail_submit.load(Ordering::SeqCst) {
            return Err(PlatformError::Timeout("submit button".to_string()));
        }
        Ok(())
    }

    fn screenshot(&mut self, _context: &str) -> Result<(), PlatformError> {
        self.calls.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory with one shared [`ScriptedCalls`] across all created adapters.
pub struct ScriptedFactory {
    calls: Arc<ScriptedCalls>,
    capabilities: PlatformCapabilities,
    ats_host: Option<String>,
    step_delay: Duration,
}

impl Default for ScriptedFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Arc::new(ScriptedCalls::default()),
            capabilities: PlatformCapabilities {
                one_step_apply: true,
                ats_iframes: true,
            },
            ats_host: None,
            step_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_ats_host(mut self, host: impl Into<String>) -> Self {
        self.ats_host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    #[must_use]
    pub fn calls(&self) -> Arc<ScriptedCalls> {
        Arc::clone(&self.calls)
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(&self, job: &JobPosting) -> Result<Box<dyn PlatformAdapter>, PlatformError> {
        self.calls.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedAdapter {
            platform: job.platform.clone(),
            capabilities: self.capabilities,
            ats_host: self.ats_host.clone(),
            step_delay: self.step_delay,
            calls: Arc::clone(&self.calls),
        }))
    }
}
