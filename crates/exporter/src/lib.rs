//! Polls CI pipelines of a GitLab project fleet and republishes them as
//! Prometheus metrics.
//!
//! See [`Orchestrator::orchestrate_polling`] for the control loop.

use std::sync::Arc;

use pipewatch_core::Config;
use pipewatch_gitlab::HttpClient;

pub mod directory;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod pool;
pub mod ratelimit;
pub mod server;
pub mod store;

pub use directory::Directory;
pub use discovery::{discover_wildcards, DiscoveryReport};
pub use error::{ExporterError, PollError};
pub use metrics::{Encoding, Metrics, RefLabels};
pub use orchestrator::{join_within, Orchestrator, OrchestratorState};
pub use poller::{PollReport, Poller};
pub use pool::run_pass;
pub use ratelimit::RateLimiter;
pub use store::ProjectStore;

/// Build the rate-gated [`Directory`] for `config` and check that the
/// endpoint answers. Returns the directory and the reported server version.
pub async fn connect(config: &Config) -> Result<(Directory, String), ExporterError> {
    let client = HttpClient::new(&config.gitlab)?;
    let limiter = Arc::new(RateLimiter::new(config.maximum_requests_per_second));
    let directory = Directory::new(Arc::new(client), limiter);

    let version = directory
        .version()
        .await
        .map_err(|source| ExporterError::Unreachable {
            url: config.gitlab.url.clone(),
            source,
        })?;
    Ok((directory, version))
}
