use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{
    Job, Page, PipelineDetail, PipelineQuery, PipelineSummary, ProjectInfo, ProjectQuery,
    Variable,
};

/// Abstraction over the remote directory.
///
/// Listing operations return one page at a time; callers drive pagination
/// with [`Page::next_page`]. Implementations do no rate limiting and no
/// retries: the exporter gates every call itself.
#[async_trait]
pub trait GitlabApi: Send + Sync {
    /// Server version. Used as a connectivity check at startup.
    async fn version(&self) -> Result<String, ClientError>;

    /// Look a project up by its full namespaced path.
    async fn get_project(&self, name: &str) -> Result<ProjectInfo, ClientError>;

    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: u32,
    ) -> Result<Page<ProjectInfo>, ClientError>;

    async fn list_branch_names(&self, project_id: u64, page: u32)
        -> Result<Page<String>, ClientError>;

    async fn list_tag_names(&self, project_id: u64, page: u32) -> Result<Page<String>, ClientError>;

    /// Pipelines, newest first.
    async fn list_pipelines(
        &self,
        project_id: u64,
        query: &PipelineQuery,
        page: u32,
    ) -> Result<Page<PipelineSummary>, ClientError>;

    async fn get_pipeline(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<PipelineDetail, ClientError>;

    async fn get_pipeline_variables(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Variable>, ClientError>;

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        page: u32,
    ) -> Result<Page<Job>, ClientError>;
}
