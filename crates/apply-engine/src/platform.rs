//! Platform-adapter capability boundary.
//!
//! One adapter per job-board variant, created per session and exclusively
//! owned by that session's worker thread. Every call is blocking; adapters
//! are expected to bound their own navigation/selector waits.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::FieldMap;
use crate::store::JobPosting;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[serde(rename = "linkedin")]
    LinkedIn,
    Indeed,
    Glassdoor,
    Other,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedIn => "linkedin",
            Self::Indeed => "indeed",
            Self::Glassdoor => "glassdoor",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known applicant-tracking-system providers whose embedded iframes we can
/// recognize inside a job page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsProvider {
    Greenhouse,
    Lever,
    Workday,
    Icims,
    Taleo,
}

impl AtsProvider {
    /// Provider heuristic over an iframe (or page) host name.
    #[must_use]
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        if host.contains("greenhouse.io") {
            Some(Self::Greenhouse)
        } else if host.contains("lever.co") {
            Some(Self::Lever)
        } else if host.contains("myworkday") || host.contains("workday.com") {
            Some(Self::Workday)
        } else if host.contains("icims.com") {
            Some(Self::Icims)
        } else if host.contains("taleo.net") {
            Some(Self::Taleo)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
            Self::Workday => "workday",
            Self::Icims => "icims",
            Self::Taleo => "taleo",
        }
    }
}

/// What a platform variant advertises it can do for a given job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// The platform offers a one-step native apply flow.
    pub one_step_apply: bool,
    /// Job pages may embed third-party ATS iframes worth detecting.
    pub ats_iframes: bool,
}

/// Summary of a form-fill pass, reported back to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilledSummary {
    pub filled: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("selector not found: {0}")]
    Selector(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("browser session error: {0}")]
    Session(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Blocking browser-automation capability set for one job board.
///
/// Dropping the adapter releases its automation resources (browser context,
/// driver session); the worker drops it on every exit path.
pub trait PlatformAdapter: Send {
    fn platform(&self) -> Platform;

    fn capabilities(&self) -> PlatformCapabilities;

    fn is_logged_in(&mut self) -> Result<bool, PlatformError>;

    fn navigate_to_job(&mut self, url: &str) -> Result<(), PlatformError>;

    /// Detect an embedded ATS iframe by known-provider heuristics.
    fn detect_ats_iframe(&mut self) -> Result<Option<AtsProvider>, PlatformError>;

    fn fill_form(&mut self, fields: &FieldMap) -> Result<FilledSummary, PlatformError>;

    fn submit(&mut self) -> Result<(), PlatformError>;

    /// Capture an audit/debug screenshot; best-effort on every exit path.
    fn screenshot(&mut self, context: &str) -> Result<(), PlatformError>;
}

/// Creates one adapter per session; the engine never shares an adapter
/// across sessions.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, job: &JobPosting) -> Result<Box<dyn PlatformAdapter>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ats_provider_heuristics_match_known_hosts() {
        assert_eq!(
            AtsProvider::from_host("boards.greenhouse.io"),
            Some(AtsProvider::Greenhouse)
        );
        assert_eq!(AtsProvider::from_host("jobs.lever.co"), Some(AtsProvider::Lever));
        assert_eq!(
            AtsProvider::from_host("acme.wd5.myworkdayjobs.com"),
            Some(AtsProvider::Workday)
        );
        assert_eq!(AtsProvider::from_host("careers-acme.icims.com"), Some(AtsProvider::Icims));
        assert_eq!(AtsProvider::from_host("acme.taleo.net"), Some(AtsProvider::Taleo));
        assert_eq!(AtsProvider::from_host("careers.acme.com"), None);
    }

    #[test]
    fn platform_serde_uses_snake_case() {
        let json = serde_json::to_string(&Platform::LinkedIn).unwrap_or_default();
        assert_eq!(json, "\"linkedin\"");
    }
}
