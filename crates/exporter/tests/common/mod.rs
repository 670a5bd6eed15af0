//! In-memory [`GitlabApi`] for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pipewatch_core::OwnerKind;
use pipewatch_exporter::{Directory, Metrics, RateLimiter};
use pipewatch_gitlab::{
    ClientError, GitlabApi, Job, Page, PipelineDetail, PipelineQuery, PipelineSummary,
    ProjectInfo, ProjectQuery, Variable,
};

/// Small pages so listings exercise pagination.
const PAGE_SIZE: usize = 2;

#[derive(Default)]
pub struct State {
    pub projects: HashMap<String, ProjectInfo>,
    /// Projects listed under an owner name.
    pub owned: HashMap<String, Vec<ProjectInfo>>,
    pub failing_owners: HashSet<String>,
    pub branches: HashMap<u64, Vec<String>>,
    pub tags: HashMap<u64, Vec<String>>,
    /// Newest first.
    pub pipelines: HashMap<u64, Vec<PipelineDetail>>,
    pub variables: HashMap<u64, Vec<Variable>>,
    pub jobs: HashMap<u64, Vec<Job>>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct MockGitlab {
    state: Mutex<State>,
}

fn paginate<T: Clone>(items: &[T], page: u32, per_page: usize) -> Page<T> {
    let page = page.max(1) as usize;
    let start = (page - 1) * per_page;
    let chunk: Vec<T> = items.iter().skip(start).take(per_page).cloned().collect();
    let next_page = (start + per_page < items.len()).then_some(page as u32 + 1);
    Page {
        items: chunk,
        next_page,
    }
}

pub fn project_info(id: u64, path: &str, topics: &[&str]) -> ProjectInfo {
    ProjectInfo {
        id,
        path_with_namespace: path.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        tag_list: Vec::new(),
    }
}

pub fn pipeline(id: u64, ref_name: &str, status: &str) -> PipelineDetail {
    PipelineDetail {
        id,
        ref_name: ref_name.to_string(),
        status: status.to_string(),
        duration: Some(60.0),
        coverage: Some("75.0".to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    }
}

pub fn job(id: u64, stage: &str, name: &str, status: &str) -> Job {
    Job {
        id,
        name: name.to_string(),
        stage: stage.to_string(),
        status: status.to_string(),
        duration: Some(5.0),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        artifacts: Vec::new(),
    }
}

impl MockGitlab {
    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Register a project with its branches.
    pub fn add_project(&self, id: u64, path: &str, branches: &[&str]) {
        let mut state = self.state();
        state
            .projects
            .insert(path.to_string(), project_info(id, path, &[]));
        state
            .branches
            .insert(id, branches.iter().map(|b| b.to_string()).collect());
    }

    /// Push a pipeline as the newest one of its project.
    pub fn push_pipeline(&self, project_id: u64, pipeline: PipelineDetail) {
        self.state()
            .pipelines
            .entry(project_id)
            .or_default()
            .insert(0, pipeline);
    }

    pub fn calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl GitlabApi for MockGitlab {
    async fn version(&self) -> Result<String, ClientError> {
        self.record("version".into());
        Ok("16.0.0".into())
    }

    async fn get_project(&self, name: &str) -> Result<ProjectInfo, ClientError> {
        self.record(format!("get_project {name}"));
        self.state()
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: u32,
    ) -> Result<Page<ProjectInfo>, ClientError> {
        self.record(format!("list_projects {page}"));
        let state = self.state();
        let owner = match &query.owner {
            Some((_, name)) => name.clone(),
            None => String::new(),
        };
        if state.failing_owners.contains(&owner) {
            return Err(ClientError::Status {
                status: 500,
                url: format!("/groups/{owner}/projects"),
            });
        }
        let matching: Vec<ProjectInfo> = state
            .owned
            .get(&owner)
            .map(|all| {
                all.iter()
                    .filter(|p| p.path_with_namespace.contains(&query.search))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(paginate(&matching, page, PAGE_SIZE))
    }

    async fn list_branch_names(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<String>, ClientError> {
        self.record(format!("list_branch_names {project_id} {page}"));
        let items = self.state().branches.get(&project_id).cloned().unwrap_or_default();
        Ok(paginate(&items, page, PAGE_SIZE))
    }

    async fn list_tag_names(&self, project_id: u64, page: u32) -> Result<Page<String>, ClientError> {
        self.record(format!("list_tag_names {project_id} {page}"));
        let items = self.state().tags.get(&project_id).cloned().unwrap_or_default();
        Ok(paginate(&items, page, PAGE_SIZE))
    }

    async fn list_pipelines(
        &self,
        project_id: u64,
        query: &PipelineQuery,
        page: u32,
    ) -> Result<Page<PipelineSummary>, ClientError> {
        self.record(format!("list_pipelines {project_id} {page}"));
        let items: Vec<PipelineSummary> = self
            .state()
            .pipelines
            .get(&project_id)
            .map(|all| {
                all.iter()
                    .filter(|p| query.ref_name.as_ref().map_or(true, |r| *r == p.ref_name))
                    .map(|p| PipelineSummary {
                        id: p.id,
                        ref_name: p.ref_name.clone(),
                        status: p.status.clone(),
                        created_at: Some(p.created_at),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(paginate(&items, page, query.per_page as usize))
    }

    async fn get_pipeline(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<PipelineDetail, ClientError> {
        self.record(format!("get_pipeline {project_id} {pipeline_id}"));
        self.state()
            .pipelines
            .get(&project_id)
            .and_then(|all| all.iter().find(|p| p.id == pipeline_id).cloned())
            .ok_or_else(|| ClientError::NotFound(format!("pipeline {pipeline_id}")))
    }

    async fn get_pipeline_variables(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Variable>, ClientError> {
        self.record(format!("get_pipeline_variables {project_id} {pipeline_id}"));
        Ok(self.state().variables.get(&pipeline_id).cloned().unwrap_or_default())
    }

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        page: u32,
    ) -> Result<Page<Job>, ClientError> {
        self.record(format!("list_pipeline_jobs {project_id} {pipeline_id} {page}"));
        let items = self.state().jobs.get(&pipeline_id).cloned().unwrap_or_default();
        Ok(paginate(&items, page, PAGE_SIZE))
    }
}

/// A directory over `mock` with a limit high enough not to slow tests down.
pub fn directory(mock: &Arc<MockGitlab>) -> Directory {
    directory_with_rate(mock, 1000)
}

/// A directory over `mock` admitting `per_second` calls.
pub fn directory_with_rate(mock: &Arc<MockGitlab>, per_second: u32) -> Directory {
    let api: Arc<dyn GitlabApi> = mock.clone();
    Directory::new(api, Arc::new(RateLimiter::new(per_second)))
}

pub fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

/// Lines of the text exposition belonging to `family`.
pub fn series<'a>(text: &'a str, family: &str) -> Vec<&'a str> {
    let prefix = format!("{family}{{");
    text.lines().filter(|l| l.starts_with(&prefix)).collect()
}

pub fn group(name: &str) -> Option<(OwnerKind, String)> {
    Some((OwnerKind::Group, name.to_string()))
}
