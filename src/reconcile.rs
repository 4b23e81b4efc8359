//! Source reconciliation.
//!
//! Brings every record of a source's namespace in line with the files of
//! the source repository. The run has four phases:
//!
//! 1. **Pin** the source ref to one commit id. Every later call uses that
//!    id, so a push during the run cannot produce a mixed snapshot.
//! 2. **Enumerate** the desired state: page through the recursive tree
//!    listing, keep blobs under the content path, then look up each file's
//!    last commit through a bounded pool of concurrent requests.
//! 3. **Diff** the desired `path → commit` map against the stored
//!    `extern_path → version_cookie` map.
//! 4. **Execute** the planned create / update / delete actions one by one,
//!    recording per-item failures instead of aborting.
//!
//! Only failures while pinning or listing the tree abort the run. A failed
//! per-file lookup is reported and the path is left alone: it is neither
//! created nor treated as stale.
//!
//! Cancellation during enumeration aborts with [`ContentError::Cancelled`].
//! Cancellation during execution stops before the next action; actions
//! already committed stay committed and the report is marked incomplete.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ContentError, ContentResult};
use crate::gitlab::TreeRequest;
use crate::models::{ContentSource, SourceType, TextDraft};
use crate::queries::{self, SourcedRecord};
use crate::sync::{cancellable, check_source, ItemSyncer};

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    pub source: String,
    /// Commit id the run was pinned to.
    pub commit: String,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    /// False when the run was cancelled before all actions executed.
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub path: String,
    pub code: &'static str,
    pub message: String,
}

impl ReconciliationReport {
    fn record_failure(&mut self, path: &str, err: &ContentError) {
        warn!(path, error = %err, "reconciliation item failed");
        self.failed += 1;
        self.failures.push(ItemFailure {
            path: path.to_string(),
            code: err.code(),
            message: err.to_string(),
        });
    }

    /// True when nothing had to change.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.failed == 0
    }
}

/// What the diff decided for one path.
#[derive(Debug, Clone)]
pub enum Action {
    Create { path: String, commit: String },
    Update { record: SourcedRecord, commit: String },
    Delete { record: SourcedRecord },
    Skip { path: String },
}

/// Files of the source at the pinned commit.
#[derive(Debug, Default)]
pub struct DesiredState {
    /// `path → last commit id`.
    pub files: BTreeMap<String, String>,
    /// Paths seen in the listing whose commit lookup failed.
    pub unresolved: Vec<(String, ContentError)>,
}

pub struct SourceReconciler {
    syncer: ItemSyncer,
    concurrency: usize,
    page_size: u32,
}

impl SourceReconciler {
    pub fn new(syncer: ItemSyncer, concurrency: usize, page_size: u32) -> Self {
        Self {
            syncer,
            concurrency: concurrency.max(1),
            page_size,
        }
    }

    pub async fn reconcile_source(
        &self,
        source: &ContentSource,
        cancel: &CancellationToken,
    ) -> ContentResult<ReconciliationReport> {
        if source.source_type != SourceType::Gitlab {
            return Err(ContentError::UnsupportedSource(source.source_type.to_string()));
        }
        check_source(source)?;

        let git = self.syncer.git();
        let commit = cancellable(cancel, git.resolve_ref(source, &source.git_ref)).await?;
        info!(
            source = %source.name,
            git_ref = %source.git_ref,
            commit = %commit,
            "reconciling source"
        );

        let desired = self.enumerate(source, &commit, cancel).await?;

        let actual: Vec<SourcedRecord> = {
            let mut conn = self.syncer.writer().pool().acquire().await?;
            queries::list_sourced(&mut conn, &source.namespace, SourceType::Gitlab).await?
        }
        .into_iter()
        .filter(|r| source.matches_path(&r.extern_path))
        .collect();

        let unresolved: HashSet<&str> = desired
            .unresolved
            .iter()
            .map(|(p, _)| p.as_str())
            .collect();
        let actions = plan(&desired.files, actual, &unresolved);

        let mut report = ReconciliationReport {
            source: source.name.clone(),
            commit: commit.clone(),
            complete: true,
            ..Default::default()
        };
        for (path, err) in &desired.unresolved {
            report.record_failure(path, err);
        }

        self.execute(source, &commit, actions, &mut report, cancel).await;

        info!(
            source = %source.name,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            complete = report.complete,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Build the desired-state map for `source` at `commit`.
    pub async fn enumerate(
        &self,
        source: &ContentSource,
        commit: &str,
        cancel: &CancellationToken,
    ) -> ContentResult<DesiredState> {
        let git = self.syncer.git();
        let list_path = source
            .content_path_prefix
            .as_deref()
            .filter(|p| p.ends_with('/'))
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty());

        let mut paths: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page: u32 = 1;
        loop {
            let request = TreeRequest {
                path: list_path,
                git_ref: commit,
                recursive: true,
                page,
                per_page: self.page_size,
            };
            let tree = cancellable(cancel, git.list_tree(source, &request)).await?;
            debug!(page, entries = tree.entries.len(), "listed tree page");

            for entry in tree.entries {
                if !entry.is_blob() || !source.matches_path(&entry.path) {
                    continue;
                }
                if seen.insert(entry.path.clone()) {
                    paths.push(entry.path);
                }
            }

            match tree.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        let lookups: Vec<(String, ContentResult<String>)> = stream::iter(paths)
            .map(|path| async move {
                let result = cancellable(cancel, git.file_commit(source, &path, commit)).await;
                (path, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(ContentError::Cancelled);
        }

        let mut desired = DesiredState::default();
        for (path, result) in lookups {
            match result {
                Ok(file_commit) => {
                    desired.files.insert(path, file_commit);
                }
                Err(err) => desired.unresolved.push((path, err)),
            }
        }
        desired.unresolved.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(desired)
    }

    async fn execute(
        &self,
        source: &ContentSource,
        commit: &str,
        actions: Vec<Action>,
        report: &mut ReconciliationReport,
        cancel: &CancellationToken,
    ) {
        let writer = self.syncer.writer();

        for action in actions {
            if cancel.is_cancelled() {
                report.complete = false;
                break;
            }

            let (path, outcome) = match action {
                Action::Skip { .. } => {
                    report.skipped += 1;
                    continue;
                }
                Action::Create {
                    path,
                    commit: file_commit,
                } => {
                    let outcome = self
                        .create_from_source(source, &path, commit, &file_commit, cancel)
                        .await;
                    if outcome.is_ok() {
                        report.created += 1;
                    }
                    (path, outcome)
                }
                Action::Update {
                    record,
                    commit: file_commit,
                } => {
                    let outcome = match writer.get_text_by_internal_id(record.id).await {
                        Ok(item) => self
                            .syncer
                            .sync_from_git(&item, source, commit, Some(&file_commit), cancel)
                            .await
                            .map(|_| ()),
                        Err(err) => Err(err),
                    };
                    if outcome.is_ok() {
                        report.updated += 1;
                    }
                    (record.extern_path, outcome)
                }
                Action::Delete { record } => {
                    let outcome = writer.delete_text(record.id).await;
                    if outcome.is_ok() {
                        debug!(
                            public_id = %record.public_id,
                            path = %record.extern_path,
                            "deleted stale content"
                        );
                        report.deleted += 1;
                    }
                    (record.extern_path, outcome)
                }
            };

            match outcome {
                Ok(()) => {}
                Err(ContentError::Cancelled) => {
                    report.complete = false;
                    break;
                }
                Err(err) => report.record_failure(&path, &err),
            }
        }
    }

    async fn create_from_source(
        &self,
        source: &ContentSource,
        path: &str,
        commit: &str,
        file_commit: &str,
        cancel: &CancellationToken,
    ) -> ContentResult<()> {
        let mut draft = draft_for_path(source, path);
        let mut candidates = slug_candidates(relative_path(source, path)).into_iter();
        let created = loop {
            let Some(slug) = candidates.next() else {
                return Err(ContentError::Conflict(format!(
                    "no free slug for '{}' in namespace '{}'",
                    path, source.namespace
                )));
            };
            draft.slug = slug;
            match self.syncer.writer().create_text(&draft).await {
                Ok(created) => break created,
                Err(ContentError::Conflict(reason)) => {
                    debug!(path, slug = %draft.slug, %reason, "slug taken, trying next");
                }
                Err(err) => return Err(err),
            }
        };
        self.syncer
            .sync_from_git(&created, source, commit, Some(file_commit), cancel)
            .await?;
        Ok(())
    }
}

/// Diff desired files against stored records.
///
/// Actions come out in path order: desired paths first, then stale records.
pub fn plan(
    desired: &BTreeMap<String, String>,
    actual: Vec<SourcedRecord>,
    unresolved: &HashSet<&str>,
) -> Vec<Action> {
    let mut stored: HashMap<String, SourcedRecord> = actual
        .into_iter()
        .map(|r| (r.extern_path.clone(), r))
        .collect();

    let mut actions = Vec::new();
    for (path, commit) in desired {
        match stored.remove(path) {
            None => actions.push(Action::Create {
                path: path.clone(),
                commit: commit.clone(),
            }),
            Some(record) if record.version_cookie != *commit => actions.push(Action::Update {
                record,
                commit: commit.clone(),
            }),
            Some(_) => actions.push(Action::Skip { path: path.clone() }),
        }
    }

    let mut stale: Vec<SourcedRecord> = stored
        .into_values()
        .filter(|r| !unresolved.contains(r.extern_path.as_str()))
        .collect();
    stale.sort_by(|a, b| a.extern_path.cmp(&b.extern_path));
    actions.extend(stale.into_iter().map(|record| Action::Delete { record }));

    actions
}

/// Path below the source's content prefix.
fn relative_path<'a>(source: &ContentSource, path: &'a str) -> &'a str {
    source
        .content_path_prefix
        .as_deref()
        .and_then(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
        .trim_start_matches('/')
}

/// Draft for a file that appeared in the source.
fn draft_for_path(source: &ContentSource, path: &str) -> TextDraft {
    let relative = relative_path(source, path);

    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    };

    TextDraft {
        namespace: source.namespace.clone(),
        slug: slug_for(relative),
        title: stem.to_string(),
        summary: None,
        format: format_for(extension).to_string(),
        text: None,
        extern_path: Some(path.to_string()),
        source_type: SourceType::Gitlab,
        contributors: Vec::new(),
    }
}

fn slug_for(relative: &str) -> String {
    let without_ext = match relative.rsplit_once('.') {
        Some((head, _)) if !head.is_empty() && !head.ends_with('/') => head,
        _ => relative,
    };
    fold(without_ext)
}

/// Slugs to try in order when creating a record for `relative`.
///
/// Folding is lossy (`intro.md` and `intro.txt`, `a_b` and `a-b`), so the
/// later candidates keep the extension and finally the path itself.
fn slug_candidates(relative: &str) -> Vec<String> {
    let mut candidates = vec![slug_for(relative), fold(&relative.replace('.', "-"))];
    candidates.push(relative.to_string());
    candidates.dedup();
    candidates
}

fn fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn format_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        _ => "text",
    }
}
