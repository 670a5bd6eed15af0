//! Per-project fetch parameters and their three-level resolution.
//!
//! A field set on the project wins over the global `defaults` section, which
//! wins over the built-in constant. Layers are never merged beyond that: each
//! field is resolved on its own.

use serde::{Deserialize, Serialize};

/// Built-in value for `fetch_pipeline_job_metrics`.
pub const DEFAULT_FETCH_PIPELINE_JOB_METRICS: bool = false;
/// Built-in value for `output_sparse_status_metrics`.
pub const DEFAULT_OUTPUT_SPARSE_STATUS_METRICS: bool = false;
/// Built-in value for `fetch_pipeline_variables`.
pub const DEFAULT_FETCH_PIPELINE_VARIABLES: bool = false;
/// Built-in value for `pipeline_variables_filter_regexp`.
pub const DEFAULT_PIPELINE_VARIABLES_FILTER_REGEXP: &str = ".*";
/// Built-in value for `refs_regexp`: only the usual default branch names.
pub const DEFAULT_REFS_REGEXP: &str = "^(main|master)$";

/// Optional overrides. `None` means "not set at this layer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_pipeline_job_metrics: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_sparse_status_metrics: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_pipeline_variables: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_variables_filter_regexp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs_regexp: Option<String>,
}

/// Fully resolved parameters for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveParameters {
    pub fetch_pipeline_job_metrics: bool,
    pub output_sparse_status_metrics: bool,
    pub fetch_pipeline_variables: bool,
    pub pipeline_variables_filter_regexp: String,
    pub refs_regexp: String,
}

/// First present value in precedence order.
fn first_present<T: Clone>(project: &Option<T>, defaults: &Option<T>, builtin: T) -> T {
    project
        .as_ref()
        .or(defaults.as_ref())
        .cloned()
        .unwrap_or(builtin)
}

impl Parameters {
    /// Resolve `self` (the project layer) against the config-level `defaults`.
    pub fn resolve(&self, defaults: &Parameters) -> EffectiveParameters {
        EffectiveParameters {
            fetch_pipeline_job_metrics: first_present(
                &self.fetch_pipeline_job_metrics,
                &defaults.fetch_pipeline_job_metrics,
                DEFAULT_FETCH_PIPELINE_JOB_METRICS,
            ),
            output_sparse_status_metrics: first_present(
                &self.output_sparse_status_metrics,
                &defaults.output_sparse_status_metrics,
                DEFAULT_OUTPUT_SPARSE_STATUS_METRICS,
            ),
            fetch_pipeline_variables: first_present(
                &self.fetch_pipeline_variables,
                &defaults.fetch_pipeline_variables,
                DEFAULT_FETCH_PIPELINE_VARIABLES,
            ),
            pipeline_variables_filter_regexp: first_present(
                &self.pipeline_variables_filter_regexp,
                &defaults.pipeline_variables_filter_regexp,
                DEFAULT_PIPELINE_VARIABLES_FILTER_REGEXP.to_string(),
            ),
            refs_regexp: first_present(
                &self.refs_regexp,
                &defaults.refs_regexp,
                DEFAULT_REFS_REGEXP.to_string(),
            ),
        }
    }

    /// Iterate over the regular expressions set at this layer, with their field name.
    pub fn regexps(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("pipeline_variables_filter_regexp", self.pipeline_variables_filter_regexp.as_deref()),
            ("refs_regexp", self.refs_regexp.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}
