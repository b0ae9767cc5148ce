//! Candidate-profile collaborator: the field-name to value mapping used to
//! fill application forms.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::store::JobPosting;

/// Field-name to value mapping, ordered for deterministic fills.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub trait ProfileSource: Send + Sync {
    fn field_map(&self, job: &JobPosting) -> FieldMap;
}

/// Fixed field map loaded once, typically from a TOML file of
/// `field = "value"` pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticProfile {
    fields: FieldMap,
}

impl StaticProfile {
    #[must_use]
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn from_toml_str(path: &str, raw: &str) -> Result<Self, ProfileError> {
        let fields: FieldMap = toml::from_str(raw).map_err(|source| ProfileError::Parse {
            path: path.to_string(),
            source,
        })?;
        Ok(Self { fields })
    }

    pub fn from_path(path: &Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&path.display().to_string(), &raw)
    }

    /// Minimal demo profile for local runs without a profile file.
    #[must_use]
    pub fn sample() -> Self {
        let mut fields = FieldMap::new();
        fields.insert("full_name".to_string(), "Ada Candidate".to_string());
        fields.insert("email".to_string(), "ada@example.com".to_string());
        fields.insert("phone".to_string(), "+1-555-0100".to_string());
        fields.insert(
            "resume_url".to_string(),
            "https://example.com/ada/resume.pdf".to_string(),
        );
        Self { fields }
    }

    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

impl ProfileSource for StaticProfile {
    fn field_map(&self, _job: &JobPosting) -> FieldMap {
        self.fields.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_toml_field_pairs() -> anyhow::Result<()> {
        let profile = StaticProfile::from_toml_str(
            "inline",
            "full_name = \"Ada Candidate\"\nemail = \"ada@example.com\"\n",
        )?;
        assert_eq!(
            profile.fields().get("full_name").map(String::as_str),
            Some("Ada Candidate")
        );
        Ok(())
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let err = StaticProfile::from_toml_str("bad.toml", "not = = toml");
        assert!(matches!(err, Err(ProfileError::Parse { .. })));
    }

    #[test]
    fn loads_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "email = \"ada@example.com\"")?;
        let profile = StaticProfile::from_path(file.path())?;
        assert_eq!(profile.fields().len(), 1);
        Ok(())
    }
}
