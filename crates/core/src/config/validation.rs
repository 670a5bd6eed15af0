use std::collections::HashSet;

use regex::Regex;

use crate::error::ConfigError;
use crate::params::Parameters;

use super::types::Config;

impl Config {
    /// Validate the config. Any error here is fatal: the exporter must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_endpoint()?;
        self.validate_limits()?;
        self.validate_projects()?;
        self.validate_wildcards()?;
        validate_regexps("defaults", &self.defaults)?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.gitlab.url)
            .map_err(|_| ConfigError::Url(self.gitlab.url.clone()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            _ => Err(ConfigError::Url(self.gitlab.url.clone())),
        }
    }

    fn validate_limits(&self) -> Result<(), ConfigError> {
        if self.maximum_requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "maximum_requests_per_second must be greater than 0".into(),
            ));
        }
        if self.refs_polling_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "refs_polling_interval_seconds must be greater than 0".into(),
            ));
        }
        if self.wildcards_discover_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "wildcards_discover_interval_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Names must be non-empty and unique; every regexp must compile.
    fn validate_projects(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                return Err(ConfigError::Invalid("project with an empty name".into()));
            }
            if !seen.insert(project.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "project '{}' is declared more than once",
                    project.name
                )));
            }
            validate_regexps(&format!("projects[{}]", project.name), &project.parameters)?;
        }
        Ok(())
    }

    fn validate_wildcards(&self) -> Result<(), ConfigError> {
        for (i, wildcard) in self.wildcards.iter().enumerate() {
            if let Some(owner) = &wildcard.owner {
                if owner.name.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "wildcards[{i}] has an owner with an empty name"
                    )));
                }
            }
            validate_regexps(&format!("wildcards[{i}]"), &wildcard.parameters)?;
        }
        Ok(())
    }
}

fn validate_regexps(scope: &str, parameters: &Parameters) -> Result<(), ConfigError> {
    for (field, pattern) in parameters.regexps() {
        Regex::new(pattern).map_err(|source| ConfigError::Regex {
            field: format!("{scope}.{field}"),
            source,
        })?;
    }
    Ok(())
}
