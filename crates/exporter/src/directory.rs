//! Rate-gated, paginating facade over a [`GitlabApi`].
//!
//! Every request, including each page of a listing, acquires a slot from
//! the shared [`RateLimiter`] before it is sent.

use std::future::Future;
use std::sync::Arc;

use pipewatch_gitlab::{
    ClientError, GitlabApi, Job, Page, PipelineDetail, PipelineQuery, PipelineSummary,
    ProjectInfo, ProjectQuery, Variable,
};

use crate::ratelimit::RateLimiter;

/// Shared handle used by discovery and pollers.
#[derive(Clone)]
pub struct Directory {
    api: Arc<dyn GitlabApi>,
    limiter: Arc<RateLimiter>,
}

impl Directory {
    pub fn new(api: Arc<dyn GitlabApi>, limiter: Arc<RateLimiter>) -> Self {
        Self { api, limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch pages until the server reports no next page.
    async fn collect_pages<T, F, Fut>(&self, mut fetch: F) -> Result<Vec<T>, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, ClientError>>,
    {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            self.limiter.acquire().await;
            let result = fetch(page).await?;
            items.extend(result.items);
            match result.next_page {
                Some(next) if next > page => page = next,
                _ => return Ok(items),
            }
        }
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        self.limiter.acquire().await;
        self.api.version().await
    }

    pub async fn project(&self, name: &str) -> Result<ProjectInfo, ClientError> {
        self.limiter.acquire().await;
        self.api.get_project(name).await
    }

    pub async fn projects(&self, query: &ProjectQuery) -> Result<Vec<ProjectInfo>, ClientError> {
        self.collect_pages(|page| self.api.list_projects(query, page))
            .await
    }

    pub async fn branch_names(&self, project_id: u64) -> Result<Vec<String>, ClientError> {
        self.collect_pages(|page| self.api.list_branch_names(project_id, page))
            .await
    }

    pub async fn tag_names(&self, project_id: u64) -> Result<Vec<String>, ClientError> {
        self.collect_pages(|page| self.api.list_tag_names(project_id, page))
            .await
    }

    /// Most recent pipeline of `ref_name`, if any.
    pub async fn latest_pipeline(
        &self,
        project_id: u64,
        ref_name: &str,
    ) -> Result<Option<PipelineSummary>, ClientError> {
        self.limiter.acquire().await;
        let page = self
            .api
            .list_pipelines(project_id, &PipelineQuery::latest_for(ref_name), 1)
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// Up to `depth` most recent pipelines across all refs, newest first.
    pub async fn recent_pipelines(
        &self,
        project_id: u64,
        depth: u32,
    ) -> Result<Vec<PipelineSummary>, ClientError> {
        let query = PipelineQuery::recent(depth);
        let wanted = depth as usize;
        let mut pipelines = Vec::new();
        let mut page = 1;
        while pipelines.len() < wanted {
            self.limiter.acquire().await;
            let result = self.api.list_pipelines(project_id, &query, page).await?;
            pipelines.extend(result.items);
            match result.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        pipelines.truncate(wanted);
        Ok(pipelines)
    }

    pub async fn pipeline(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<PipelineDetail, ClientError> {
        self.limiter.acquire().await;
        self.api.get_pipeline(project_id, pipeline_id).await
    }

    pub async fn pipeline_variables(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Variable>, ClientError> {
        self.limiter.acquire().await;
        self.api.get_pipeline_variables(project_id, pipeline_id).await
    }

    pub async fn pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Job>, ClientError> {
        self.collect_pages(|page| self.api.list_pipeline_jobs(project_id, pipeline_id, page))
            .await
    }
}
