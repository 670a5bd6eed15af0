use std::path::Path;

use crate::error::ConfigError;

use super::types::Config;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl Config {
    /// Parse config from a YAML string, apply env overrides, validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_with(yaml, |key| std::env::var(key).ok())
    }

    /// Like [`Config::from_yaml`], with overrides read through `lookup`
    /// instead of the process environment.
    pub(crate) fn from_yaml_with(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_overrides_from(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply overrides, each variable read through `lookup`.
    ///
    /// Convention: `PIPEWATCH_SECTION_KEY` overrides `section.key`.
    /// - `PIPEWATCH_GITLAB_URL` -> `gitlab.url`
    /// - `PIPEWATCH_GITLAB_TOKEN` -> `gitlab.token`
    /// - `PIPEWATCH_POLLING_WORKERS` -> `polling_workers`
    /// - `PIPEWATCH_MAXIMUM_REQUESTS_PER_SECOND` -> `maximum_requests_per_second`
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PIPEWATCH_GITLAB_URL") {
            self.gitlab.url = v;
        }
        if let Some(v) = lookup("PIPEWATCH_GITLAB_TOKEN") {
            self.gitlab.token = v;
        }
        if let Some(v) = lookup("PIPEWATCH_POLLING_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                self.polling_workers = n;
            }
        }
        if let Some(v) = lookup("PIPEWATCH_MAXIMUM_REQUESTS_PER_SECOND") {
            if let Ok(n) = v.parse::<u32>() {
                self.maximum_requests_per_second = n;
            }
        }
    }
}
