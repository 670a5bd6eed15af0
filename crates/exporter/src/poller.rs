//! Per-project ref and pipeline polling.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use pipewatch_core::{EffectiveParameters, Parameters, Project};
use pipewatch_gitlab::{ClientError, Job, PipelineDetail, ProjectInfo, Variable};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::PollError;
use crate::metrics::{Metrics, RefLabels};

/// Outcome of one successful project poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub project: String,
    pub refs_polled: usize,
    pub pipelines_published: usize,
}

/// Fetches the latest pipeline state of a project's refs and publishes it.
pub struct Poller {
    directory: Directory,
    metrics: Arc<Metrics>,
    /// Config-level `defaults`, the middle resolution layer.
    defaults: Parameters,
}

/// Everything fetched for one ref before anything is published.
struct RefSnapshot {
    ref_name: String,
    pipeline: PipelineDetail,
    variables: Option<String>,
    jobs: Vec<Job>,
}

impl Poller {
    pub fn new(directory: Directory, metrics: Arc<Metrics>, defaults: Parameters) -> Self {
        Self {
            directory,
            metrics,
            defaults,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Poll every branch and tag of `project` matching its refs regexp.
    pub async fn poll(&self, project: &Project) -> Result<PollReport, PollError> {
        let params = project.parameters.resolve(&self.defaults);
        let info = self.lookup(project).await?;

        let filter = Regex::new(&params.refs_regexp).map_err(|source| {
            PollError::InvalidRefsRegexp {
                project: project.name.clone(),
                pattern: params.refs_regexp.clone(),
                source,
            }
        })?;
        let refs = self.matching_refs(project, &info, &filter).await?;
        if refs.is_empty() {
            warn!(
                project = %project.name,
                refs_regexp = %params.refs_regexp,
                "No refs matched"
            );
        }

        self.poll_resolved(project, &info, &params, &refs).await
    }

    /// Poll an explicit ref list, bypassing the refs regexp.
    pub async fn poll_refs(
        &self,
        project: &Project,
        refs: &[String],
    ) -> Result<PollReport, PollError> {
        let params = project.parameters.resolve(&self.defaults);
        let info = self.lookup(project).await?;
        self.poll_resolved(project, &info, &params, refs).await
    }

    /// Rebuild recent ref activity from the last `depth` pipelines, then poll
    /// exactly the distinct refs found there.
    pub async fn replay(&self, project: &Project, depth: u32) -> Result<PollReport, PollError> {
        let info = self.lookup(project).await?;
        let pipelines = self
            .directory
            .recent_pipelines(info.id, depth)
            .await
            .map_err(remote(project, "list recent pipelines"))?;

        let mut refs: Vec<String> = Vec::new();
        for pipeline in pipelines {
            if !refs.contains(&pipeline.ref_name) {
                refs.push(pipeline.ref_name);
            }
        }
        info!(
            project = %project.name,
            depth,
            refs = refs.len(),
            "Replaying refs from pipeline history"
        );

        let params = project.parameters.resolve(&self.defaults);
        self.poll_resolved(project, &info, &params, &refs).await
    }

    async fn lookup(&self, project: &Project) -> Result<ProjectInfo, PollError> {
        self.directory
            .project(&project.name)
            .await
            .map_err(|source| PollError::Lookup {
                project: project.name.clone(),
                source,
            })
    }

    /// Union of matching branch and tag names, sorted and deduplicated.
    async fn matching_refs(
        &self,
        project: &Project,
        info: &ProjectInfo,
        filter: &Regex,
    ) -> Result<Vec<String>, PollError> {
        let branches = self
            .directory
            .branch_names(info.id)
            .await
            .map_err(remote(project, "list branches"))?;
        let tags = self
            .directory
            .tag_names(info.id)
            .await
            .map_err(remote(project, "list tags"))?;

        let refs: BTreeSet<String> = branches
            .into_iter()
            .chain(tags)
            .filter(|name| filter.is_match(name))
            .collect();
        Ok(refs.into_iter().collect())
    }

    async fn poll_resolved(
        &self,
        project: &Project,
        info: &ProjectInfo,
        params: &EffectiveParameters,
        refs: &[String],
    ) -> Result<PollReport, PollError> {
        let variables_filter = if params.fetch_pipeline_variables {
            match Regex::new(&params.pipeline_variables_filter_regexp) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(
                        project = %project.name,
                        pattern = %params.pipeline_variables_filter_regexp,
                        error = %e,
                        "Invalid variables filter, not fetching variables this pass"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut report = PollReport {
            project: project.name.clone(),
            ..Default::default()
        };

        for ref_name in refs {
            report.refs_polled += 1;
            let Some(snapshot) = self
                .fetch_ref(project, info, params, variables_filter.as_ref(), ref_name)
                .await?
            else {
                continue;
            };
            self.publish(info, params, snapshot);
            report.pipelines_published += 1;
        }

        debug!(
            project = %report.project,
            refs = report.refs_polled,
            pipelines = report.pipelines_published,
            "Project polled"
        );
        Ok(report)
    }

    async fn fetch_ref(
        &self,
        project: &Project,
        info: &ProjectInfo,
        params: &EffectiveParameters,
        variables_filter: Option<&Regex>,
        ref_name: &str,
    ) -> Result<Option<RefSnapshot>, PollError> {
        let latest = self
            .directory
            .latest_pipeline(info.id, ref_name)
            .await
            .map_err(remote(project, "list pipelines"))?;
        let Some(latest) = latest else {
            info!(project = %project.name, ref_name, "No pipeline found for ref");
            return Ok(None);
        };

        let pipeline = self
            .directory
            .pipeline(info.id, latest.id)
            .await
            .map_err(remote(project, "get pipeline"))?;

        let variables = match variables_filter {
            Some(filter) => {
                let all = self
                    .directory
                    .pipeline_variables(info.id, pipeline.id)
                    .await
                    .map_err(remote(project, "get pipeline variables"))?;
                Some(format_variables(&all, filter))
            }
            None => None,
        };

        let jobs = if params.fetch_pipeline_job_metrics {
            self.directory
                .pipeline_jobs(info.id, pipeline.id)
                .await
                .map_err(remote(project, "list pipeline jobs"))?
        } else {
            Vec::new()
        };

        Ok(Some(RefSnapshot {
            ref_name: ref_name.to_string(),
            pipeline,
            variables,
            jobs,
        }))
    }

    fn publish(&self, info: &ProjectInfo, params: &EffectiveParameters, snapshot: RefSnapshot) {
        let now = Utc::now();
        let sparse = params.output_sparse_status_metrics;
        let labels = RefLabels::new(&info.path_with_namespace, info.labels(), snapshot.ref_name);

        self.metrics
            .publish_pipeline(&labels, &snapshot.pipeline, sparse, now);
        if let Some(variables) = snapshot.variables {
            self.metrics.publish_variables(&labels, &variables);
        }
        for job in &snapshot.jobs {
            self.metrics.publish_job(&labels, job, sparse, now);
        }
    }
}

fn remote<'a>(
    project: &'a Project,
    operation: &'static str,
) -> impl FnOnce(ClientError) -> PollError + 'a {
    move |source| PollError::Remote {
        project: project.name.clone(),
        operation,
        source,
    }
}

/// `KEY:value` pairs of the variables whose key matches, comma-joined.
fn format_variables(variables: &[Variable], filter: &Regex) -> String {
    variables
        .iter()
        .filter(|v| filter.is_match(&v.key))
        .map(|v| format!("{}:{}", v.key, v.value))
        .collect::<Vec<_>>()
        .join(",")
}
