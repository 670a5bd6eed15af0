use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::params::Parameters;

// ── Top-level config ────────────────────────────────────────────────

/// Root configuration, parsed once at startup from `pipewatch.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint and credentials.
    pub gitlab: GitlabConfig,

    /// Concurrent pollers per pass. 0 = available parallelism.
    #[serde(default)]
    pub polling_workers: usize,

    /// Process-wide ceiling on outbound calls per second.
    #[serde(default = "default_maximum_requests_per_second")]
    pub maximum_requests_per_second: u32,

    /// Period of the wildcard discovery timer.
    #[serde(default = "default_wildcards_discover_interval")]
    pub wildcards_discover_interval_seconds: u64,

    /// Period of the ref polling timer.
    #[serde(default = "default_refs_polling_interval")]
    pub refs_polling_interval_seconds: u64,

    /// Replay recent pipeline history once at startup.
    #[serde(default)]
    pub on_init_fetch_refs_from_pipelines: bool,

    /// How many recent pipelines per project the on-init replay inspects.
    #[serde(default = "default_on_init_fetch_depth")]
    pub on_init_fetch_depth: u32,

    /// Global parameter defaults (second resolution layer).
    #[serde(default)]
    pub defaults: Parameters,

    #[serde(default)]
    pub projects: Vec<Project>,

    #[serde(default)]
    pub wildcards: Vec<Wildcard>,
}

fn default_maximum_requests_per_second() -> u32 { 10 }
fn default_wildcards_discover_interval() -> u64 { 1800 }
fn default_refs_polling_interval() -> u64 { 30 }
fn default_on_init_fetch_depth() -> u32 { 100 }

impl Config {
    /// Config with only an endpoint set and every other field at its default.
    pub fn for_endpoint(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            gitlab: GitlabConfig {
                url: url.into(),
                token: token.into(),
                skip_tls_verify: false,
            },
            polling_workers: 0,
            maximum_requests_per_second: default_maximum_requests_per_second(),
            wildcards_discover_interval_seconds: default_wildcards_discover_interval(),
            refs_polling_interval_seconds: default_refs_polling_interval(),
            on_init_fetch_refs_from_pipelines: false,
            on_init_fetch_depth: default_on_init_fetch_depth(),
            defaults: Parameters::default(),
            projects: Vec::new(),
            wildcards: Vec::new(),
        }
    }

    /// Resolve worker count (0 means use available parallelism).
    pub fn resolved_polling_workers(&self) -> usize {
        if self.polling_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.polling_workers
        }
    }

    pub fn wildcards_discover_interval(&self) -> Duration {
        Duration::from_secs(self.wildcards_discover_interval_seconds)
    }

    pub fn refs_polling_interval(&self) -> Duration {
        Duration::from_secs(self.refs_polling_interval_seconds)
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  gitlab:      url={}, token={}", self.gitlab.url, if self.gitlab.token.is_empty() { "(none)" } else { "(set)" });
        tracing::info!("  polling:     workers={}, interval={}s", self.resolved_polling_workers(), self.refs_polling_interval_seconds);
        tracing::info!("  discovery:   interval={}s, wildcards={}", self.wildcards_discover_interval_seconds, self.wildcards.len());
        tracing::info!("  rate limit:  {} req/s", self.maximum_requests_per_second);
        tracing::info!("  on-init:     enabled={}, depth={}", self.on_init_fetch_refs_from_pipelines, self.on_init_fetch_depth);
        tracing::info!("  projects:    {}", self.projects.len());
    }
}

// ── Sections ────────────────────────────────────────────────────────

/// Remote endpoint section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabConfig {
    /// Base URL, e.g. `https://gitlab.com`.
    pub url: String,

    /// Private token sent with every request.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub skip_tls_verify: bool,
}

/// A project to poll. Identity is `name` (the full namespaced path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(flatten)]
    pub parameters: Parameters,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Parameters::default(),
        }
    }

    pub fn with_parameters(name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// Whether a wildcard owner is a user or a group namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Group,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::User => write!(f, "user"),
            OwnerKind::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardOwner {
    pub name: String,
    pub kind: OwnerKind,

    /// Only meaningful for groups.
    #[serde(default)]
    pub include_subgroups: bool,
}

/// Search pattern expanding into zero or more projects. Never polled itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wildcard {
    /// Substring matched against project names. Empty matches everything.
    #[serde(default)]
    pub search: String,

    /// Restrict the search to one user or group. `None` searches the whole instance.
    #[serde(default)]
    pub owner: Option<WildcardOwner>,

    /// Include archived projects.
    #[serde(default)]
    pub archived: bool,

    /// Inherited by every project this wildcard discovers.
    #[serde(flatten)]
    pub parameters: Parameters,
}
