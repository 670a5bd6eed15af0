use chrono::{DateTime, Utc};
use pipewatch_core::OwnerKind;
use serde::{Deserialize, Serialize};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    /// A single, final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Project as returned by the lookup and listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Older servers only report `tag_list`.
    #[serde(default)]
    pub tag_list: Vec<String>,
}

impl ProjectInfo {
    /// Topic labels, preferring `topics` over the legacy `tag_list`.
    pub fn labels(&self) -> &[String] {
        if self.topics.is_empty() {
            &self.tag_list
        } else {
            &self.topics
        }
    }
}

/// Filter for [`crate::GitlabApi::list_projects`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectQuery {
    /// `None` lists across the whole instance.
    pub owner: Option<(OwnerKind, String)>,
    pub search: String,
    /// When false archived projects are excluded.
    pub archived: bool,
    pub include_subgroups: bool,
}

/// Filter for [`crate::GitlabApi::list_pipelines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineQuery {
    pub ref_name: Option<String>,
    pub per_page: u32,
}

impl PipelineQuery {
    /// The most recent pipeline of one ref.
    pub fn latest_for(ref_name: impl Into<String>) -> Self {
        Self {
            ref_name: Some(ref_name.into()),
            per_page: 1,
        }
    }

    /// The `depth` most recent pipelines across all refs.
    pub fn recent(depth: u32) -> Self {
        Self {
            ref_name: None,
            per_page: depth.clamp(1, 100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: u64,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDetail {
    pub id: u64,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub status: String,
    /// Seconds. Absent while the pipeline has not finished.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Coverage percentage as text, e.g. `"87.5"`.
    #[serde(default)]
    pub coverage: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub status: String,
    #[serde(default)]
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Job {
    /// Sum of all artifact sizes in bytes.
    pub fn artifact_size(&self) -> u64 {
        self.artifacts.iter().filter_map(|a| a.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_labels_prefer_topics() {
        let json = r#"{"id": 4, "path_with_namespace": "g/p", "topics": ["a", "b"], "tag_list": ["old"]}"#;
        let p: ProjectInfo = serde_json::from_str(json).unwrap();
        assert_eq!(p.labels(), &["a".to_string(), "b".to_string()]);

        let json = r#"{"id": 4, "path_with_namespace": "g/p", "tag_list": ["old"]}"#;
        let p: ProjectInfo = serde_json::from_str(json).unwrap();
        assert_eq!(p.labels(), &["old".to_string()]);
    }

    #[test]
    fn pipeline_detail_from_api_json() {
        let json = r#"{
            "id": 46,
            "ref": "main",
            "status": "success",
            "duration": 31.5,
            "coverage": "30.0",
            "created_at": "2024-03-01T10:00:00.000Z",
            "sha": "a91957a858320c0e17f3a0eca7cfacbff50ea29a"
        }"#;
        let p: PipelineDetail = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, 46);
        assert_eq!(p.ref_name, "main");
        assert_eq!(p.duration, Some(31.5));
        assert_eq!(p.coverage.as_deref(), Some("30.0"));
    }

    #[test]
    fn running_pipeline_has_no_duration() {
        let json = r#"{"id": 1, "ref": "dev", "status": "running", "duration": null,
                       "coverage": null, "created_at": "2024-03-01T10:00:00Z"}"#;
        let p: PipelineDetail = serde_json::from_str(json).unwrap();
        assert_eq!(p.duration, None);
        assert_eq!(p.coverage, None);
    }

    #[test]
    fn job_artifact_size_sums() {
        let json = r#"{"id": 7, "name": "build", "stage": "test", "status": "failed",
                       "duration": 12.0, "created_at": "2024-03-01T10:00:00Z",
                       "artifacts": [{"size": 100}, {"size": 23}, {"size": null}]}"#;
        let j: Job = serde_json::from_str(json).unwrap();
        assert_eq!(j.artifact_size(), 123);
    }

    #[test]
    fn recent_query_clamps_depth() {
        assert_eq!(PipelineQuery::recent(0).per_page, 1);
        assert_eq!(PipelineQuery::recent(500).per_page, 100);
        assert_eq!(PipelineQuery::latest_for("main").per_page, 1);
    }
}
