//! reqwest-backed [`GitlabApi`] implementation.

use async_trait::async_trait;
use pipewatch_core::{GitlabConfig, OwnerKind};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;
use crate::traits::GitlabApi;
use crate::types::{
    Job, Page, PipelineDetail, PipelineQuery, PipelineSummary, ProjectInfo, ProjectQuery,
    Variable,
};

/// Page size requested from listing endpoints (the API maximum).
const PER_PAGE: u32 = 100;

/// Header carrying the next page number on paginated responses.
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// HTTP client for the GitLab REST v4 API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// `<url>/api/v4`, no trailing slash.
    base: String,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

impl HttpClient {
    /// Build a client from the `gitlab` config section.
    pub fn new(config: &GitlabConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if !config.token.is_empty() {
            let mut token = HeaderValue::from_str(&config.token)
                .map_err(|_| ClientError::Config("token is not a valid header value".into()))?;
            token.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", token);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("pipewatch/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base: api_base(&config.url),
            client,
        })
    }

    /// GET `path` with query parameters and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(T, Option<u32>), ClientError> {
        let url = format!("{}{}", self.base, path);
        tracing::trace!(url = %url, "GET");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let next_page = parse_next_page(
            response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
            url,
            message: e.to_string(),
        })?;
        Ok((body, next_page))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
        page: u32,
    ) -> Result<Page<T>, ClientError> {
        if !query.iter().any(|(k, _)| *k == "per_page") {
            query.push(("per_page", PER_PAGE.to_string()));
        }
        query.push(("page", page.max(1).to_string()));
        let (items, next_page) = self.get_json(path, &query).await?;
        Ok(Page { items, next_page })
    }
}

/// `https://host/` -> `https://host/api/v4`
fn api_base(url: &str) -> String {
    format!("{}/api/v4", url.trim_end_matches('/'))
}

/// Encode a namespaced path as a single path segment (`a/b` -> `a%2Fb`).
fn encode_path(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes()).collect()
}

/// Empty or missing header means this was the last page.
fn parse_next_page(header: Option<&str>) -> Option<u32> {
    header
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

fn projects_path(query: &ProjectQuery) -> String {
    match &query.owner {
        Some((OwnerKind::User, name)) => format!("/users/{}/projects", encode_path(name)),
        Some((OwnerKind::Group, name)) => format!("/groups/{}/projects", encode_path(name)),
        None => "/projects".to_string(),
    }
}

#[async_trait]
impl GitlabApi for HttpClient {
    async fn version(&self) -> Result<String, ClientError> {
        let (v, _): (VersionResponse, _) = self.get_json("/version", &[]).await?;
        Ok(v.version)
    }

    async fn get_project(&self, name: &str) -> Result<ProjectInfo, ClientError> {
        let path = format!("/projects/{}", encode_path(name));
        match self.get_json(&path, &[]).await {
            Ok((project, _)) => Ok(project),
            Err(ClientError::NotFound(_)) => Err(ClientError::NotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: u32,
    ) -> Result<Page<ProjectInfo>, ClientError> {
        let mut params = vec![("search", query.search.clone())];
        if !query.archived {
            params.push(("archived", "false".to_string()));
        }
        if matches!(query.owner, Some((OwnerKind::Group, _))) {
            params.push(("include_subgroups", query.include_subgroups.to_string()));
        }
        self.get_page(&projects_path(query), params, page).await
    }

    async fn list_branch_names(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<String>, ClientError> {
        let path = format!("/projects/{project_id}/repository/branches");
        let refs: Page<NamedRef> = self.get_page(&path, Vec::new(), page).await?;
        Ok(Page {
            items: refs.items.into_iter().map(|r| r.name).collect(),
            next_page: refs.next_page,
        })
    }

    async fn list_tag_names(&self, project_id: u64, page: u32) -> Result<Page<String>, ClientError> {
        let path = format!("/projects/{project_id}/repository/tags");
        let refs: Page<NamedRef> = self.get_page(&path, Vec::new(), page).await?;
        Ok(Page {
            items: refs.items.into_iter().map(|r| r.name).collect(),
            next_page: refs.next_page,
        })
    }

    async fn list_pipelines(
        &self,
        project_id: u64,
        query: &PipelineQuery,
        page: u32,
    ) -> Result<Page<PipelineSummary>, ClientError> {
        let path = format!("/projects/{project_id}/pipelines");
        let mut params = vec![
            ("per_page", query.per_page.to_string()),
            ("order_by", "id".to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(r) = &query.ref_name {
            params.push(("ref", r.clone()));
        }
        self.get_page(&path, params, page).await
    }

    async fn get_pipeline(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<PipelineDetail, ClientError> {
        let path = format!("/projects/{project_id}/pipelines/{pipeline_id}");
        let (pipeline, _) = self.get_json(&path, &[]).await?;
        Ok(pipeline)
    }

    async fn get_pipeline_variables(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Variable>, ClientError> {
        let path = format!("/projects/{project_id}/pipelines/{pipeline_id}/variables");
        let (variables, _) = self.get_json(&path, &[]).await?;
        Ok(variables)
    }

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        page: u32,
    ) -> Result<Page<Job>, ClientError> {
        let path = format!("/projects/{project_id}/pipelines/{pipeline_id}/jobs");
        self.get_page(&path, Vec::new(), page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_strips_trailing_slash() {
        assert_eq!(api_base("https://gitlab.com/"), "https://gitlab.com/api/v4");
        assert_eq!(api_base("https://gitlab.com"), "https://gitlab.com/api/v4");
    }

    #[test]
    fn namespaced_path_is_one_segment() {
        assert_eq!(encode_path("group/sub/project"), "group%2Fsub%2Fproject");
    }

    #[test]
    fn next_page_header() {
        assert_eq!(parse_next_page(Some("3")), Some(3));
        assert_eq!(parse_next_page(Some("")), None);
        assert_eq!(parse_next_page(Some("  ")), None);
        assert_eq!(parse_next_page(None), None);
        assert_eq!(parse_next_page(Some("x")), None);
    }

    #[test]
    fn projects_path_per_owner() {
        let mut q = ProjectQuery::default();
        assert_eq!(projects_path(&q), "/projects");
        q.owner = Some((OwnerKind::User, "alice".into()));
        assert_eq!(projects_path(&q), "/users/alice/projects");
        q.owner = Some((OwnerKind::Group, "foo/bar".into()));
        assert_eq!(projects_path(&q), "/groups/foo%2Fbar/projects");
    }

    #[test]
    fn client_builds_with_token() {
        let cfg = GitlabConfig {
            url: "https://gitlab.example.com".into(),
            token: "glpat-abc".into(),
            skip_tls_verify: false,
        };
        let client = HttpClient::new(&cfg).unwrap();
        assert_eq!(client.base, "https://gitlab.example.com/api/v4");
    }

    #[test]
    fn client_rejects_unprintable_token() {
        let cfg = GitlabConfig {
            url: "https://gitlab.example.com".into(),
            token: "bad\ntoken".into(),
            skip_tls_verify: false,
        };
        assert!(matches!(HttpClient::new(&cfg), Err(ClientError::Config(_))));
    }
}
