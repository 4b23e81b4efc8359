use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::models::{ContentSource, SourceType};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where relative extern paths are resolved from.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("content-sync/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    /// Upper bound on concurrent per-file metadata lookups.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            page_size: default_page_size(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_page_size() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub gitlab: HashMap<String, GitlabSourceConfig>,
}

/// One `[sources.gitlab.<name>]` table.
///
/// `api_host` and `project_id` are optional at load time; their absence is
/// reported when the source is reconciled.
#[derive(Debug, Deserialize, Clone)]
pub struct GitlabSourceConfig {
    #[serde(default)]
    pub api_host: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub content_path: Option<String>,
    pub namespace: String,
    #[serde(default = "default_git_ref")]
    pub git_ref: String,
}

fn default_git_ref() -> String {
    "master".to_string()
}

impl Config {
    /// All configured sources as descriptors, sorted by name.
    pub fn content_sources(&self) -> Vec<ContentSource> {
        let mut sources: Vec<ContentSource> = self
            .sources
            .gitlab
            .iter()
            .map(|(name, cfg)| ContentSource {
                name: name.clone(),
                source_type: SourceType::Gitlab,
                api_host: cfg.api_host.clone().unwrap_or_default(),
                api_token: cfg.api_token.clone().unwrap_or_default(),
                project_id: cfg.project_id.clone().unwrap_or_default(),
                content_path_prefix: cfg.content_path.clone().filter(|p| !p.is_empty()),
                namespace: cfg.namespace.clone(),
                git_ref: cfg.git_ref.clone(),
            })
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    pub fn find_source(&self, name: &str) -> Option<ContentSource> {
        self.content_sources().into_iter().find(|s| s.name == name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    if config.reconcile.concurrency == 0 {
        anyhow::bail!("reconcile.concurrency must be >= 1");
    }

    if !(1..=100).contains(&config.reconcile.page_size) {
        anyhow::bail!("reconcile.page_size must be in [1, 100]");
    }

    if let Some(base) = &config.content.base_url {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("content.base_url must be an http(s) URL, got '{}'", base);
        }
    }

    // Reconciliation owns every GitLab record of its namespace.
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    let mut names: Vec<&String> = config.sources.gitlab.keys().collect();
    names.sort();
    for name in names {
        let source = &config.sources.gitlab[name];
        if source.namespace.trim().is_empty() {
            anyhow::bail!("sources.gitlab.{}.namespace must not be empty", name);
        }
        if let Some(other) = owners.insert(source.namespace.as_str(), name.as_str()) {
            anyhow::bail!(
                "sources.gitlab.{} and sources.gitlab.{} both use namespace '{}'",
                other,
                name,
                source.namespace
            );
        }
    }

    Ok(())
}
