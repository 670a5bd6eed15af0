//! Client for the GitLab REST v4 API, limited to what the exporter reads.
//!
//! The exporter only depends on the [`GitlabApi`] trait; [`HttpClient`] is
//! the reqwest-backed implementation used by the binary.

pub mod error;
pub mod http;
pub mod traits;
pub mod types;

pub use error::ClientError;
pub use http::HttpClient;
pub use traits::GitlabApi;
pub use types::{
    Artifact, Job, Page, PipelineDetail, PipelineQuery, PipelineSummary, ProjectInfo,
    ProjectQuery, Variable,
};
