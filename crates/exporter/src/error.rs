//! Error types for the exporter.

use pipewatch_gitlab::ClientError;
use thiserror::Error;

/// Startup errors. Any of these aborts before the control loop runs.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("failed to build client: {0}")]
    Client(#[from] ClientError),

    #[error("endpoint {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: ClientError,
    },
}

/// Failure of one project's unit of work. The project is skipped for this
/// pass only; the next scheduled pass retries it.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("project '{project}': lookup failed: {source}")]
    Lookup {
        project: String,
        #[source]
        source: ClientError,
    },

    #[error("project '{project}': invalid refs_regexp '{pattern}': {source}")]
    InvalidRefsRegexp {
        project: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("project '{project}': {operation} failed: {source}")]
    Remote {
        project: String,
        operation: &'static str,
        #[source]
        source: ClientError,
    },
}

impl PollError {
    /// Name of the project the error belongs to.
    pub fn project(&self) -> &str {
        match self {
            PollError::Lookup { project, .. }
            | PollError::InvalidRefsRegexp { project, .. }
            | PollError::Remote { project, .. } => project,
        }
    }
}
