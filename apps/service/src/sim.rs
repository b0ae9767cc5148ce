//! Simulated platform adapter for local runs and tests.
//!
//! Walks the full apply flow without a browser: navigation and form fill
//! sleep for a configurable step delay, ATS detection runs the provider
//! heuristic over the job URL, and screenshots are debug log lines.

use std::time::Duration;

use tracing::debug;

use apply_engine::platform::{
    AdapterFactory, AtsProvider, FilledSummary, Platform, PlatformAdapter, PlatformCapabilities,
    PlatformError,
};
use apply_engine::profile::FieldMap;
use apply_engine::store::JobPosting;

pub struct SimulatedAdapter {
    platform: Platform,
    job_url: String,
    step_delay: Duration,
}

impl PlatformAdapter for SimulatedAdapter {
    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            // LinkedIn models the one-step native flow; everything else goes
            // through a full form.
            one_step_apply: matches!(self.platform, Platform::LinkedIn),
            ats_iframes: true,
        }
    }

    fn is_logged_in(&mut self) -> Result<bool, PlatformError> {
        Ok(true)
    }

    fn navigate_to_job(&mut self, url: &str) -> Result<(), PlatformError> {
        std::thread::sleep(self.step_delay);
        debug!(%url, "simulated navigation");
        Ok(())
    }

    fn detect_ats_iframe(&mut self) -> Result<Option<AtsProvider>, PlatformError> {
        let host = self
            .job_url
            .split('/')
            .nth(2)
            .unwrap_or(self.job_url.as_str());
        Ok(AtsProvider::from_host(host))
    }

    fn fill_form(&mut self, fields: &FieldMap) -> Result<FilledSummary, PlatformError> {
        std::thread::sleep(self.step_delay);
        Ok(FilledSummary {
            filled: fields.keys().cloned().collect(),
            skipped: Vec::new(),
        })
    }

    fn submit(&mut self) -> Result<(), PlatformError> {
        std::thread::sleep(self.step_delay);
        Ok(())
    }

    fn screenshot(&mut self, context: &str) -> Result<(), PlatformError> {
        debug!(platform = %self.platform, context, "simulated screenshot");
        Ok(())
    }
}

pub struct SimulatedAdapterFactory {
    step_delay: Duration,
}

impl SimulatedAdapterFactory {
    #[must_use]
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl AdapterFactory for SimulatedAdapterFactory {
    fn create(&self, job: &JobPosting) -> Result<Box<dyn PlatformAdapter>, PlatformError> {
        Ok(Box::new(SimulatedAdapter {
            platform: job.platform.clone(),
            job_url: job.url.clone(),
            step_delay: self.step_delay,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apply_engine::store::JobId;

    fn posting(url: &str) -> JobPosting {
        JobPosting {
            job_id: JobId::from("globex::platform-engineer"),
            title: "Platform Engineer".to_string(),
            company: "Globex".to_string(),
            url: url.to_string(),
            platform: Platform::Other,
        }
    }

    #[test]
    fn detects_ats_provider_from_job_url() -> anyhow::Result<()> {
        let factory = SimulatedAdapterFactory::new(Duration::ZERO);
        let mut adapter = factory
            .create(&posting("https://boards.greenhouse.io/globex/jobs/42"))
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        assert_eq!(adapter.detect_ats_iframe().ok().flatten(), Some(AtsProvider::Greenhouse));
        Ok(())
    }

    #[test]
    fn plain_career_pages_have_no_ats_frame() -> anyhow::Result<()> {
        let factory = SimulatedAdapterFactory::new(Duration::ZERO);
        let mut adapter = factory
            .create(&posting("https://careers.globex.com/jobs/42"))
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        assert_eq!(adapter.detect_ats_iframe().ok().flatten(), None);
        Ok(())
    }
}
