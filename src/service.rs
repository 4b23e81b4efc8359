//! The operations exposed to a request boundary.
//!
//! [`ContentService`] wires the transactional writer, the single-item
//! synchronizer and the source reconciler together over one SQLite pool and
//! one pair of external clients.
//!
//! | Operation | Delegates to |
//! |-----------|--------------|
//! | [`create_text`](ContentService::create_text) | writer, then best-effort sync |
//! | [`update_text_fields`](ContentService::update_text_fields) | writer |
//! | [`update_contributors`](ContentService::update_contributors) | writer |
//! | [`update_text_only`](ContentService::update_text_only) | writer |
//! | [`sync_one`](ContentService::sync_one) | synchronizer |
//! | [`reconcile_source`](ContentService::reconcile_source) | reconciler |

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::error::{ContentError, ContentResult};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::gitlab::{GitApi, GitLabClient};
use crate::models::{
    ContentSource, ContentTypeText, NewContributor, Person, PublicId, TextDraft, TextPatch,
};
use crate::people;
use crate::reconcile::{ReconciliationReport, SourceReconciler};
use crate::sync::ItemSyncer;
use crate::writer::ContentWriter;

/// Result of a successful creation.
///
/// The record is committed in both variants. A failed initial sync does not
/// undo the creation; it is carried alongside as a warning.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(ContentTypeText),
    CreatedWithWarning {
        content: ContentTypeText,
        warning: ContentError,
    },
}

impl CreateOutcome {
    pub fn content(&self) -> &ContentTypeText {
        match self {
            CreateOutcome::Created(content) => content,
            CreateOutcome::CreatedWithWarning { content, .. } => content,
        }
    }

    pub fn warning(&self) -> Option<&ContentError> {
        match self {
            CreateOutcome::Created(_) => None,
            CreateOutcome::CreatedWithWarning { warning, .. } => Some(warning),
        }
    }

    pub fn into_content(self) -> ContentTypeText {
        match self {
            CreateOutcome::Created(content) => content,
            CreateOutcome::CreatedWithWarning { content, .. } => content,
        }
    }
}

pub struct ContentService {
    writer: ContentWriter,
    syncer: ItemSyncer,
    reconciler: SourceReconciler,
}

impl ContentService {
    /// Build a service talking to real HTTP and GitLab endpoints.
    pub fn new(pool: SqlitePool, config: &Config) -> ContentResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        let git = Arc::new(GitLabClient::new(&config.http)?);
        Ok(Self::with_collaborators(pool, config, fetcher, git))
    }

    /// Build a service over caller-supplied external clients.
    pub fn with_collaborators(
        pool: SqlitePool,
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        git: Arc<dyn GitApi>,
    ) -> Self {
        let writer = ContentWriter::new(pool);
        let syncer = ItemSyncer::new(
            writer.clone(),
            fetcher,
            git,
            config.content.base_url.clone(),
            config.content_sources(),
        );
        let reconciler = SourceReconciler::new(
            syncer.clone(),
            config.reconcile.concurrency,
            config.reconcile.page_size,
        );
        Self {
            writer,
            syncer,
            reconciler,
        }
    }

    pub fn writer(&self) -> &ContentWriter {
        &self.writer
    }

    /// Create a text record, then pull its body if it has an extern path.
    ///
    /// The creation transaction is committed before the sync starts.
    pub async fn create_text(
        &self,
        draft: &TextDraft,
        cancel: &CancellationToken,
    ) -> ContentResult<CreateOutcome> {
        let created = self.writer.create_text(draft).await?;

        if created.summary.extern_path.is_none() {
            return Ok(CreateOutcome::Created(created));
        }

        match self.syncer.sync_one(&created, cancel).await {
            Ok(synced) => Ok(CreateOutcome::Created(synced)),
            Err(warning) => {
                warn!(
                    public_id = %created.public_id(),
                    error = %warning,
                    "record created, but initial sync with external resource failed"
                );
                Ok(CreateOutcome::CreatedWithWarning {
                    content: created,
                    warning,
                })
            }
        }
    }

    pub async fn update_text_fields(
        &self,
        public_id: &PublicId,
        patch: &TextPatch,
    ) -> ContentResult<ContentTypeText> {
        self.writer.update_text_fields(public_id, patch).await
    }

    pub async fn update_text_fields_by_slug(
        &self,
        namespace: &str,
        slug: &str,
        patch: &TextPatch,
    ) -> ContentResult<ContentTypeText> {
        self.writer
            .update_text_fields_by_slug(namespace, slug, patch)
            .await
    }

    pub async fn update_contributors(
        &self,
        public_id: &PublicId,
        contributors: &[NewContributor],
    ) -> ContentResult<ContentTypeText> {
        self.writer.update_contributors(public_id, contributors).await
    }

    pub async fn update_contributors_by_slug(
        &self,
        namespace: &str,
        slug: &str,
        contributors: &[NewContributor],
    ) -> ContentResult<ContentTypeText> {
        self.writer
            .update_contributors_by_slug(namespace, slug, contributors)
            .await
    }

    pub async fn update_text_only(
        &self,
        public_id: &PublicId,
        text: &str,
    ) -> ContentResult<ContentTypeText> {
        self.writer.update_text_only(public_id, text, None).await
    }

    /// Load the record with `public_id` and refresh it from its source.
    pub async fn sync_one(
        &self,
        public_id: &PublicId,
        cancel: &CancellationToken,
    ) -> ContentResult<ContentTypeText> {
        let item = self.writer.get_text(public_id).await?;
        self.syncer.sync_one(&item, cancel).await
    }

    pub async fn reconcile_source(
        &self,
        source: &ContentSource,
        cancel: &CancellationToken,
    ) -> ContentResult<ReconciliationReport> {
        self.reconciler.reconcile_source(source, cancel).await
    }

    pub async fn get_text(&self, public_id: &PublicId) -> ContentResult<ContentTypeText> {
        self.writer.get_text(public_id).await
    }

    pub async fn create_person(&self, display_name: &str) -> ContentResult<Person> {
        people::create_person(self.writer.pool(), display_name).await
    }

    pub async fn get_person(&self, public_id: &PublicId) -> ContentResult<Person> {
        people::get_person(self.writer.pool(), public_id).await
    }

    pub async fn get_text_by_slug(
        &self,
        namespace: &str,
        slug: &str,
    ) -> ContentResult<ContentTypeText> {
        self.writer.get_text_by_slug(namespace, slug).await
    }
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn open(config: &Config) -> anyhow::Result<(SqlitePool, ContentService)> {
    let pool = db::connect(config).await?;
    let service = ContentService::new(pool.clone(), config)?;
    Ok((pool, service))
}

/// CLI entry point for `content-sync create`.
pub async fn run_create(config: &Config, draft_path: &Path, json: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(draft_path)
        .with_context(|| format!("Failed to read draft file: {}", draft_path.display()))?;
    let draft: TextDraft =
        serde_json::from_str(&raw).with_context(|| "Failed to parse draft file")?;

    let (pool, service) = open(config).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let result = service.create_text(&draft, &cancel).await;
    pool.close().await;
    let outcome = result?;

    if let Some(warning) = outcome.warning() {
        eprintln!("warning [{}]: {}", warning.code(), warning);
    }
    let content = outcome.content();
    if json {
        println!("{}", serde_json::to_string_pretty(content)?);
    } else {
        println!(
            "Created {}/{} as {}",
            content.summary.namespace,
            content.summary.slug,
            content.public_id()
        );
    }
    Ok(())
}

/// CLI entry point for `content-sync sync <public-id>`.
pub async fn run_sync(config: &Config, public_id: &str, json: bool) -> anyhow::Result<()> {
    let public_id = PublicId::parse(public_id)?;
    let (pool, service) = open(config).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let result = service.sync_one(&public_id, &cancel).await;
    pool.close().await;
    let content = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&content)?);
    } else {
        println!(
            "Synchronized {} ({} bytes, version '{}')",
            content.public_id(),
            content.text.len(),
            content.summary.version_cookie
        );
    }
    Ok(())
}

/// CLI entry point for `content-sync reconcile <source>`.
pub async fn run_reconcile(config: &Config, source_name: &str, json: bool) -> anyhow::Result<()> {
    let source = config
        .find_source(source_name)
        .ok_or_else(|| anyhow::anyhow!("no content source named '{}'", source_name))?;

    let (pool, service) = open(config).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let result = service.reconcile_source(&source, &cancel).await;
    pool.close().await;
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Reconciled '{}' at {}", report.source, report.commit);
        println!("  created: {}", report.created);
        println!("  updated: {}", report.updated);
        println!("  deleted: {}", report.deleted);
        println!("  skipped: {}", report.skipped);
        println!("  failed:  {}", report.failed);
        for failure in &report.failures {
            println!("    {} [{}] {}", failure.path, failure.code, failure.message);
        }
        if report.is_noop() {
            println!("Already up to date.");
        }
        if !report.complete {
            println!("Run was cancelled before all actions executed.");
        }
    }
    Ok(())
}

/// CLI entry point for `content-sync person add <name>`.
pub async fn run_add_person(config: &Config, display_name: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let result = people::create_person(&pool, display_name).await;
    pool.close().await;
    let person = result?;
    println!("{}\t{}", person.public_id, person.display_name);
    Ok(())
}

/// CLI entry point for `content-sync person show <public-id>`.
pub async fn run_show_person(config: &Config, public_id: &str) -> anyhow::Result<()> {
    let public_id = PublicId::parse(public_id)?;
    let (pool, service) = open(config).await?;
    let result = service.get_person(&public_id).await;
    pool.close().await;
    let person = result?;
    println!("{}\t{}", person.public_id, person.display_name);
    Ok(())
}
