//! GitLab repository access.
//!
//! Talks to the GitLab REST API v4 with `reqwest`. Only the four calls the
//! synchronization core needs are implemented:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`resolve_ref`](GitApi::resolve_ref) | `GET /projects/:id/repository/commits/:ref` |
//! | [`list_tree`](GitApi::list_tree) | `GET /projects/:id/repository/tree` |
//! | [`file_commit`](GitApi::file_commit) | `HEAD /projects/:id/repository/files/:path` |
//! | [`raw_file`](GitApi::raw_file) | `GET /projects/:id/repository/files/:path/raw` |
//!
//! The tree listing is paginated; the next page number is read from the
//! `X-Next-Page` header, which is empty on the last page.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::{ContentError, ContentResult};
use crate::models::ContentSource;

/// One node of a repository tree listing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    /// `blob` for files, `tree` for directories.
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreePage {
    pub entries: Vec<TreeEntry>,
    /// `None` once the last page has been returned.
    pub next_page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TreeRequest<'a> {
    /// Directory to list, repository root if `None`.
    pub path: Option<&'a str>,
    pub git_ref: &'a str,
    pub recursive: bool,
    pub page: u32,
    pub per_page: u32,
}

/// Git-hosting API collaborator used by source reconciliation.
#[async_trait]
pub trait GitApi: Send + Sync {
    /// Resolve a branch, tag or sha to a commit id.
    async fn resolve_ref(&self, source: &ContentSource, git_ref: &str) -> ContentResult<String>;

    async fn list_tree(
        &self,
        source: &ContentSource,
        request: &TreeRequest<'_>,
    ) -> ContentResult<TreePage>;

    /// Id of the last commit that touched `path` as of `git_ref`.
    async fn file_commit(
        &self,
        source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String>;

    async fn raw_file(
        &self,
        source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String>;
}

pub struct GitLabClient {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CommitResponse {
    id: String,
}

impl GitLabClient {
    pub fn new(config: &HttpConfig) -> ContentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ContentError::configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        source: &ContentSource,
        url: String,
    ) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        if source.api_token.is_empty() {
            builder
        } else {
            builder.header("PRIVATE-TOKEN", &source.api_token)
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> ContentResult<reqwest::Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ContentError::retrieval(format!("{}: {}", what, e)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(ContentError::retrieval_status(
                format!("{} (HTTP {})", what, status),
                status,
            ));
        }
        Ok(resp)
    }
}

#[async_trait]
impl GitApi for GitLabClient {
    async fn resolve_ref(&self, source: &ContentSource, git_ref: &str) -> ContentResult<String> {
        let url = format!(
            "{}/repository/commits/{}",
            project_url(source),
            encode_component(git_ref)
        );
        let what = format!("resolving ref '{}' of project '{}'", git_ref, source.project_id);
        let resp = self
            .send(self.request(reqwest::Method::GET, source, url), &what)
            .await?;
        let commit: CommitResponse = resp
            .json()
            .await
            .map_err(|e| ContentError::retrieval(format!("{}: {}", what, e)))?;
        Ok(commit.id)
    }

    async fn list_tree(
        &self,
        source: &ContentSource,
        request: &TreeRequest<'_>,
    ) -> ContentResult<TreePage> {
        let mut query = vec![
            ("ref".to_string(), request.git_ref.to_string()),
            ("recursive".to_string(), request.recursive.to_string()),
            ("page".to_string(), request.page.to_string()),
            ("per_page".to_string(), request.per_page.to_string()),
        ];
        if let Some(path) = request.path {
            query.push(("path".to_string(), path.to_string()));
        }

        let url = format!("{}/repository/tree", project_url(source));
        let what = format!(
            "listing tree page {} of project '{}' from '{}'",
            request.page, source.project_id, source.api_host
        );
        let resp = self
            .send(
                self.request(reqwest::Method::GET, source, url).query(&query),
                &what,
            )
            .await?;

        let next_page = resp
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_page);

        let entries: Vec<TreeEntry> = resp
            .json()
            .await
            .map_err(|e| ContentError::retrieval(format!("{}: {}", what, e)))?;

        Ok(TreePage { entries, next_page })
    }

    async fn file_commit(
        &self,
        source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String> {
        let url = format!(
            "{}/repository/files/{}",
            project_url(source),
            encode_component(path)
        );
        let what = format!(
            "retrieving metadata of '{}' in project '{}'",
            path, source.project_id
        );
        let resp = self
            .send(
                self.request(reqwest::Method::HEAD, source, url)
                    .query(&[("ref", git_ref)]),
                &what,
            )
            .await?;

        resp.headers()
            .get("x-gitlab-last-commit-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ContentError::retrieval(format!("{}: no last commit id header", what)))
    }

    async fn raw_file(
        &self,
        source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String> {
        let url = format!(
            "{}/repository/files/{}/raw",
            project_url(source),
            encode_component(path)
        );
        let what = format!("retrieving '{}' from project '{}'", path, source.project_id);
        let resp = self
            .send(
                self.request(reqwest::Method::GET, source, url)
                    .query(&[("ref", git_ref)]),
                &what,
            )
            .await?;
        resp.text()
            .await
            .map_err(|e| ContentError::retrieval(format!("{}: {}", what, e)))
    }
}

/// Base API URL. `api_host` may carry an explicit scheme; https is assumed otherwise.
fn api_base(api_host: &str) -> String {
    let host = api_host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}/api/v4", host)
    } else {
        format!("https://{}/api/v4", host)
    }
}

fn project_url(source: &ContentSource) -> String {
    format!(
        "{}/projects/{}",
        api_base(&source.api_host),
        encode_component(&source.project_id)
    )
}

fn parse_next_page(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

/// Percent-encode a single path component, including `/`.
fn encode_component(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
