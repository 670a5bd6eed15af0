//! Prometheus metrics published by the exporter.
//!
//! # Metrics
//!
//! ## Pipeline (labels: project, topics, ref)
//! - `gitlab_ci_pipeline_run_count` - Runs observed, edge-triggered
//! - `gitlab_ci_pipeline_last_run_id` - Id of the most recent pipeline
//! - `gitlab_ci_pipeline_last_run_duration_seconds` - Its duration
//! - `gitlab_ci_pipeline_coverage` - Its coverage percentage
//! - `gitlab_ci_pipeline_time_since_last_run_seconds` - Age of its creation
//! - `gitlab_ci_pipeline_last_run_status` - One-hot over [`STATUSES`]
//! - `gitlab_ci_pipeline_variables` - Filtered variables, as a label
//!
//! ## Job (labels: pipeline labels plus stage, job_name)
//! - `gitlab_ci_pipeline_job_run_count`
//! - `gitlab_ci_pipeline_job_last_run_duration_seconds`
//! - `gitlab_ci_pipeline_job_time_since_last_run_seconds`
//! - `gitlab_ci_pipeline_job_last_run_artifact_size`
//! - `gitlab_ci_pipeline_job_last_run_status`

mod encode;
mod runs;
mod status;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pipewatch_gitlab::{Job, PipelineDetail};
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

pub use encode::{Encoding, OPENMETRICS_CONTENT_TYPE, TEXT_CONTENT_TYPE};
pub use runs::RunTracker;
pub use status::{emit_status, StatusMemory, STATUSES};

const NAMESPACE: &str = "gitlab_ci";

const REF_LABELS: &[&str] = &["project", "topics", "ref"];
const REF_STATUS_LABELS: &[&str] = &["project", "topics", "ref", "status"];
const REF_VARIABLES_LABELS: &[&str] = &["project", "topics", "ref", "variables"];
const JOB_LABELS: &[&str] = &["project", "topics", "ref", "stage", "job_name"];
const JOB_STATUS_LABELS: &[&str] = &["project", "topics", "ref", "stage", "job_name", "status"];

/// Label values identifying one (project, ref) series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefLabels {
    pub project: String,
    /// Comma-joined topic list.
    pub topics: String,
    pub ref_name: String,
}

impl RefLabels {
    pub fn new(project: impl Into<String>, topics: &[String], ref_name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            topics: topics.join(","),
            ref_name: ref_name.into(),
        }
    }

    fn values(&self) -> [&str; 3] {
        [self.project.as_str(), self.topics.as_str(), self.ref_name.as_str()]
    }

    fn job_values<'a>(&'a self, job: &'a Job) -> [&'a str; 5] {
        [
            self.project.as_str(),
            self.topics.as_str(),
            self.ref_name.as_str(),
            job.stage.as_str(),
            job.name.as_str(),
        ]
    }
}

/// Exporter metrics on a private registry.
pub struct Metrics {
    registry: Registry,

    pub pipeline_run_count: IntCounterVec,
    pub pipeline_last_run_id: GaugeVec,
    pub pipeline_last_run_duration: GaugeVec,
    pub pipeline_coverage: GaugeVec,
    pub pipeline_time_since_last_run: GaugeVec,
    pub pipeline_last_run_status: GaugeVec,
    pub pipeline_variables: GaugeVec,

    pub job_run_count: IntCounterVec,
    pub job_last_run_duration: GaugeVec,
    pub job_time_since_last_run: GaugeVec,
    pub job_last_run_artifact_size: GaugeVec,
    pub job_last_run_status: GaugeVec,

    pipeline_runs: RunTracker,
    job_runs: RunTracker,
    pipeline_statuses: StatusMemory,
    job_statuses: StatusMemory,
    /// Last published `variables` label per ref, so a change replaces the old series.
    published_variables: Mutex<HashMap<RefLabels, String>>,
}

fn gauge(name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

/// Whole seconds elapsed since `created_at`, never negative.
fn seconds_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds().max(0);
    (millis as f64 / 1000.0).round()
}

impl Metrics {
    /// Create every metric family and register it.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let metrics = Self {
            pipeline_run_count: counter(
                "pipeline_run_count",
                "Number of pipeline runs observed",
                REF_LABELS,
            )?,
            pipeline_last_run_id: gauge(
                "pipeline_last_run_id",
                "Id of the most recent pipeline",
                REF_LABELS,
            )?,
            pipeline_last_run_duration: gauge(
                "pipeline_last_run_duration_seconds",
                "Duration of the most recent pipeline",
                REF_LABELS,
            )?,
            pipeline_coverage: gauge(
                "pipeline_coverage",
                "Coverage of the most recent pipeline",
                REF_LABELS,
            )?,
            pipeline_time_since_last_run: gauge(
                "pipeline_time_since_last_run_seconds",
                "Elapsed time since the most recent pipeline was created",
                REF_LABELS,
            )?,
            pipeline_last_run_status: gauge(
                "pipeline_last_run_status",
                "Status of the most recent pipeline",
                REF_STATUS_LABELS,
            )?,
            pipeline_variables: gauge(
                "pipeline_variables",
                "Variables of the most recent pipeline",
                REF_VARIABLES_LABELS,
            )?,
            job_run_count: counter(
                "pipeline_job_run_count",
                "Number of job runs observed",
                JOB_LABELS,
            )?,
            job_last_run_duration: gauge(
                "pipeline_job_last_run_duration_seconds",
                "Duration of the most recent job",
                JOB_LABELS,
            )?,
            job_time_since_last_run: gauge(
                "pipeline_job_time_since_last_run_seconds",
                "Elapsed time since the most recent job was created",
                JOB_LABELS,
            )?,
            job_last_run_artifact_size: gauge(
                "pipeline_job_last_run_artifact_size",
                "Artifact size in bytes of the most recent job",
                JOB_LABELS,
            )?,
            job_last_run_status: gauge(
                "pipeline_job_last_run_status",
                "Status of the most recent job",
                JOB_STATUS_LABELS,
            )?,
            pipeline_runs: RunTracker::default(),
            job_runs: RunTracker::default(),
            pipeline_statuses: StatusMemory::default(),
            job_statuses: StatusMemory::default(),
            published_variables: Mutex::new(HashMap::new()),
            registry,
        };

        metrics.register_all()?;
        Ok(metrics)
    }

    fn register_all(&self) -> Result<(), prometheus::Error> {
        self.registry.register(Box::new(self.pipeline_run_count.clone()))?;
        self.registry.register(Box::new(self.pipeline_last_run_id.clone()))?;
        self.registry.register(Box::new(self.pipeline_last_run_duration.clone()))?;
        self.registry.register(Box::new(self.pipeline_coverage.clone()))?;
        self.registry.register(Box::new(self.pipeline_time_since_last_run.clone()))?;
        self.registry.register(Box::new(self.pipeline_last_run_status.clone()))?;
        self.registry.register(Box::new(self.pipeline_variables.clone()))?;
        self.registry.register(Box::new(self.job_run_count.clone()))?;
        self.registry.register(Box::new(self.job_last_run_duration.clone()))?;
        self.registry.register(Box::new(self.job_time_since_last_run.clone()))?;
        self.registry.register(Box::new(self.job_last_run_artifact_size.clone()))?;
        self.registry.register(Box::new(self.job_last_run_status.clone()))?;
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode everything currently registered.
    pub fn encode(&self, encoding: Encoding) -> Result<String, prometheus::Error> {
        encode::encode_families(&self.registry.gather(), encoding)
    }

    /// Publish the most recent pipeline of a ref.
    pub fn publish_pipeline(
        &self,
        labels: &RefLabels,
        pipeline: &PipelineDetail,
        sparse: bool,
        now: DateTime<Utc>,
    ) {
        let values = labels.values();

        if self.pipeline_runs.observe(&values, pipeline.id, &pipeline.status) {
            self.pipeline_run_count.with_label_values(&values).inc();
        }
        self.pipeline_last_run_id
            .with_label_values(&values)
            .set(pipeline.id as f64);
        if let Some(duration) = pipeline.duration {
            self.pipeline_last_run_duration
                .with_label_values(&values)
                .set(duration);
        }
        if let Some(coverage) = pipeline.coverage.as_deref() {
            match coverage.trim().parse::<f64>() {
                Ok(value) => self.pipeline_coverage.with_label_values(&values).set(value),
                Err(e) => tracing::warn!(
                    project = %labels.project,
                    ref_name = %labels.ref_name,
                    coverage,
                    error = %e,
                    "Unparsable pipeline coverage, skipping"
                ),
            }
        }
        self.pipeline_time_since_last_run
            .with_label_values(&values)
            .set(seconds_since(pipeline.created_at, now));

        let previous = self.pipeline_statuses.replace(&values, &pipeline.status);
        emit_status(
            &self.pipeline_last_run_status,
            &values,
            &pipeline.status,
            previous.as_deref(),
            sparse,
        );
    }

    /// Publish the filtered variables of a ref's latest pipeline as one label.
    pub fn publish_variables(&self, labels: &RefLabels, variables: &str) {
        let mut published = self
            .published_variables
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let [project, topics, ref_name] = labels.values();

        if let Some(previous) = published.get(labels) {
            if previous != variables {
                let _ = self
                    .pipeline_variables
                    .remove_label_values(&[project, topics, ref_name, previous.as_str()]);
            }
        }
        self.pipeline_variables
            .with_label_values(&[project, topics, ref_name, variables])
            .set(1.0);
        published.insert(labels.clone(), variables.to_string());
    }

    /// Publish one job of a ref's latest pipeline.
    pub fn publish_job(&self, labels: &RefLabels, job: &Job, sparse: bool, now: DateTime<Utc>) {
        let values = labels.job_values(job);

        if self.job_runs.observe(&values, job.id, &job.status) {
            self.job_run_count.with_label_values(&values).inc();
        }
        if let Some(duration) = job.duration {
            self.job_last_run_duration
                .with_label_values(&values)
                .set(duration);
        }
        self.job_time_since_last_run
            .with_label_values(&values)
            .set(seconds_since(job.created_at, now));
        self.job_last_run_artifact_size
            .with_label_values(&values)
            .set(job.artifact_size() as f64);

        let previous = self.job_statuses.replace(&values, &job.status);
        emit_status(
            &self.job_last_run_status,
            &values,
            &job.status,
            previous.as_deref(),
            sparse,
        );
    }
}
