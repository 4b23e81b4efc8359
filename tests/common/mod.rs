//! Shared fixtures: a migrated SQLite file in a temp dir and in-memory
//! collaborators that record every call.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use content_sync::config::{
    Config, ContentConfig, DbConfig, GitlabSourceConfig, HttpConfig, ReconcileConfig,
    SourcesConfig,
};
use content_sync::error::{ContentError, ContentResult};
use content_sync::fetch::{FetchResponse, Fetcher};
use content_sync::gitlab::{GitApi, TreeEntry, TreePage, TreeRequest};
use content_sync::models::ContentSource;
use content_sync::service::ContentService;
use content_sync::{db, migrate};

pub async fn setup_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::open_pool(&tmp.path().join("content.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Config with one GitLab source `docs` over `articles/` and tiny pages.
pub fn test_config(base_url: Option<&str>) -> Config {
    let mut gitlab = HashMap::new();
    gitlab.insert(
        "docs".to_string(),
        GitlabSourceConfig {
            api_host: Some("gitlab.example.com".to_string()),
            api_token: None,
            project_id: Some("group/docs".to_string()),
            content_path: Some("articles/".to_string()),
            namespace: "docs".to_string(),
            git_ref: "main".to_string(),
        },
    );
    Config {
        db: DbConfig {
            path: PathBuf::from("unused.sqlite"),
        },
        content: ContentConfig {
            base_url: base_url.map(str::to_string),
        },
        http: HttpConfig::default(),
        reconcile: ReconcileConfig {
            concurrency: 3,
            page_size: 2,
        },
        sources: SourcesConfig { gitlab },
    }
}

pub fn service(
    pool: &SqlitePool,
    config: &Config,
    fetcher: &Arc<MockFetcher>,
    git: &Arc<MockGitLab>,
) -> ContentService {
    ContentService::with_collaborators(pool.clone(), config, fetcher.clone(), git.clone())
}

// ─── HTTP ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, FetchResponse>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            FetchResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &str) -> ContentResult<FetchResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ContentError::retrieval(format!("connection refused: {}", url)))
    }
}

// ─── GitLab ─────────────────────────────────────────────────────────

/// A repository at one head commit. Files map to `(last commit, body)`.
pub struct MockGitLab {
    head: Mutex<String>,
    files: Mutex<BTreeMap<String, (String, String)>>,
    dirs: Vec<String>,
    failing: Mutex<HashSet<String>>,
    cancel_on_raw: Mutex<Option<CancellationToken>>,
    calls: Mutex<Vec<String>>,
}

impl MockGitLab {
    pub fn new(head: &str, dirs: &[&str]) -> Self {
        Self {
            head: Mutex::new(head.to_string()),
            files: Mutex::new(BTreeMap::new()),
            dirs: dirs.iter().map(|d| d.to_string()).collect(),
            failing: Mutex::new(HashSet::new()),
            cancel_on_raw: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn put(&self, path: &str, commit: &str, body: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (commit.to_string(), body.to_string()));
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn set_head(&self, head: &str) {
        *self.head.lock().unwrap() = head.to_string();
    }

    pub fn fail_lookup(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Cancel `token` while serving the next raw file. The body is still returned.
    pub fn cancel_on_next_raw(&self, token: &CancellationToken) {
        *self.cancel_on_raw.lock().unwrap() = Some(token.clone());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitApi for MockGitLab {
    async fn resolve_ref(&self, _source: &ContentSource, git_ref: &str) -> ContentResult<String> {
        self.record(format!("ref:{}", git_ref));
        Ok(self.head.lock().unwrap().clone())
    }

    async fn list_tree(
        &self,
        _source: &ContentSource,
        request: &TreeRequest<'_>,
    ) -> ContentResult<TreePage> {
        self.record(format!("tree:{}@{}", request.page, request.git_ref));

        let mut entries: Vec<TreeEntry> = self
            .dirs
            .iter()
            .map(|d| TreeEntry {
                path: d.clone(),
                kind: "tree".to_string(),
            })
            .chain(self.files.lock().unwrap().keys().map(|p| TreeEntry {
                path: p.clone(),
                kind: "blob".to_string(),
            }))
            .collect();
        if let Some(dir) = request.path {
            let prefix = format!("{}/", dir);
            entries.retain(|e| e.path.starts_with(&prefix));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let per_page = request.per_page as usize;
        let start = (request.page as usize - 1) * per_page;
        let end = (start + per_page).min(entries.len());
        let page = if start < entries.len() {
            entries[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next_page = if end < entries.len() {
            Some(request.page + 1)
        } else {
            None
        };
        Ok(TreePage {
            entries: page,
            next_page,
        })
    }

    async fn file_commit(
        &self,
        _source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String> {
        self.record(format!("commit:{}@{}", path, git_ref));
        if self.failing.lock().unwrap().contains(path) {
            return Err(ContentError::retrieval_status(
                format!("metadata lookup for {} failed", path),
                503,
            ));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(commit, _)| commit.clone())
            .ok_or_else(|| ContentError::retrieval_status(format!("{} not found", path), 404))
    }

    async fn raw_file(
        &self,
        _source: &ContentSource,
        path: &str,
        git_ref: &str,
    ) -> ContentResult<String> {
        self.record(format!("raw:{}@{}", path, git_ref));
        if let Some(token) = self.cancel_on_raw.lock().unwrap().take() {
            token.cancel();
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| ContentError::retrieval_status(format!("{} not found", path), 404))
    }
}
