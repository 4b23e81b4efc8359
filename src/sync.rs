//! Single-item synchronization.
//!
//! Pulls the authoritative body of one content record from wherever its
//! `extern_path` points and stores it through
//! [`ContentWriter::update_text_only`]. Dispatch is on [`SourceType`], one
//! handler per variant:
//!
//! | Source type | Behaviour |
//! |-------------|-----------|
//! | `NONE` | Nothing to pull; the item is returned unchanged |
//! | `URL` | Resolve against the configured base if relative, then one HTTP GET |
//! | `GITLAB` | Raw file from the source configured for the item's namespace |
//!
//! A call performs at most one fetch of the body and never retries.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ContentError, ContentResult};
use crate::fetch::Fetcher;
use crate::gitlab::GitApi;
use crate::models::{ContentSource, ContentTypeText, SourceType};
use crate::writer::ContentWriter;

#[derive(Clone)]
pub struct ItemSyncer {
    writer: ContentWriter,
    fetcher: Arc<dyn Fetcher>,
    git: Arc<dyn GitApi>,
    base_url: Option<String>,
    sources: Vec<ContentSource>,
}

impl ItemSyncer {
    pub fn new(
        writer: ContentWriter,
        fetcher: Arc<dyn Fetcher>,
        git: Arc<dyn GitApi>,
        base_url: Option<String>,
        sources: Vec<ContentSource>,
    ) -> Self {
        Self {
            writer,
            fetcher,
            git,
            base_url,
            sources,
        }
    }

    pub fn git(&self) -> &Arc<dyn GitApi> {
        &self.git
    }

    pub fn writer(&self) -> &ContentWriter {
        &self.writer
    }

    /// Refresh `item` from its external location.
    ///
    /// An item without an extern path is returned unchanged.
    pub async fn sync_one(
        &self,
        item: &ContentTypeText,
        cancel: &CancellationToken,
    ) -> ContentResult<ContentTypeText> {
        let Some(path) = item.summary.extern_path.as_deref() else {
            return Ok(item.clone());
        };
        if path.is_empty() {
            return Err(ContentError::validation(format!(
                "content {} references an empty external path",
                item.public_id()
            )));
        }

        match item.source_type {
            SourceType::None => Ok(item.clone()),
            SourceType::Url => self.sync_url(item, path, cancel).await,
            SourceType::Gitlab => {
                let source = self.source_for_namespace(&item.summary.namespace)?;
                check_source(source)?;
                let commit =
                    cancellable(cancel, self.git.resolve_ref(source, &source.git_ref)).await?;
                self.sync_from_git(item, source, &commit, None, cancel).await
            }
        }
    }

    async fn sync_url(
        &self,
        item: &ContentTypeText,
        path: &str,
        cancel: &CancellationToken,
    ) -> ContentResult<ContentTypeText> {
        let location = resolve_location(path, self.base_url.as_deref())?;
        if !is_http_url(&location) {
            return Err(ContentError::validation(format!(
                "URL-type content references non-HTTP(S) URL: {}",
                location
            )));
        }

        debug!(public_id = %item.public_id(), url = %location, "fetching external content");
        let response = cancellable(cancel, self.fetcher.get(&location)).await?;
        if !response.is_success() {
            return Err(ContentError::retrieval_status(
                format!("GET {} returned HTTP {}", location, response.status),
                response.status,
            ));
        }

        let updated = self
            .writer
            .update_text_only(&item.public_id(), &response.body, None)
            .await?;
        info!(public_id = %item.public_id(), url = %location, "synchronized content");
        Ok(updated)
    }

    /// Pull `item`'s file from `source` at `git_ref`.
    ///
    /// `commit_id`, when already known from a listing, becomes the version
    /// cookie as is; otherwise the file's last commit is looked up.
    pub(crate) async fn sync_from_git(
        &self,
        item: &ContentTypeText,
        source: &ContentSource,
        git_ref: &str,
        commit_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ContentResult<ContentTypeText> {
        let path = item
            .summary
            .extern_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ContentError::validation("GitLab content requires an external path"))?;

        let commit = match commit_id {
            Some(c) => c.to_string(),
            None => cancellable(cancel, self.git.file_commit(source, path, git_ref)).await?,
        };
        let body = cancellable(cancel, self.git.raw_file(source, path, git_ref)).await?;

        let updated = self
            .writer
            .update_text_only(&item.public_id(), &body, Some(&commit))
            .await?;
        debug!(
            public_id = %item.public_id(),
            path,
            commit = %commit,
            "synchronized content from GitLab"
        );
        Ok(updated)
    }

    fn source_for_namespace(&self, namespace: &str) -> ContentResult<&ContentSource> {
        self.sources
            .iter()
            .find(|s| s.namespace == namespace)
            .ok_or_else(|| {
                ContentError::configuration(format!(
                    "no content source configured for namespace '{}'",
                    namespace
                ))
            })
    }
}

/// Turn an extern path into a fetchable location.
///
/// Relative paths (leading identifier-like segment, no scheme) are joined to
/// `base` with exactly one `/`. Anything else is returned as is.
pub fn resolve_location(path: &str, base: Option<&str>) -> ContentResult<String> {
    if !is_relative(path) {
        return Ok(path.to_string());
    }
    match base {
        Some(base) => Ok(format!("{}/{}", base.trim_end_matches('/'), path)),
        None => Err(ContentError::configuration(format!(
            "cannot resolve relative path '{}': no base content location configured",
            path
        ))),
    }
}

fn is_relative(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or("");
    let mut chars = first.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// A source must be a GitLab source with a host and project to be usable.
pub(crate) fn check_source(source: &ContentSource) -> ContentResult<()> {
    if source.source_type != SourceType::Gitlab {
        return Err(ContentError::UnsupportedSource(source.source_type.to_string()));
    }
    if source.api_host.is_empty() {
        return Err(ContentError::configuration(format!(
            "source '{}' has no 'api_host' configured",
            source.name
        )));
    }
    if source.project_id.is_empty() {
        return Err(ContentError::configuration(format!(
            "source '{}' has no 'project_id' configured",
            source.name
        )));
    }
    Ok(())
}

/// Race an external call against the caller's cancellation token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> ContentResult<T>
where
    F: Future<Output = ContentResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContentError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_base() {
        assert_eq!(
            resolve_location("docs/intro.md", Some("https://cdn.example.com/")).unwrap(),
            "https://cdn.example.com/docs/intro.md"
        );
        assert_eq!(
            resolve_location("intro.md", Some("https://cdn.example.com/content")).unwrap(),
            "https://cdn.example.com/content/intro.md"
        );
    }

    #[test]
    fn relative_path_without_base_is_configuration_error() {
        let err = resolve_location("docs/intro.md", None).unwrap_err();
        assert!(matches!(err, ContentError::Configuration(_)));
    }

    #[test]
    fn absolute_locations_pass_through() {
        for loc in [
            "https://example.com/a.md",
            "http://example.com/a.md",
            "ftp://example.com/a",
            "/srv/a.md",
        ] {
            assert_eq!(resolve_location(loc, None).unwrap(), loc);
        }
    }

    #[test]
    fn only_http_schemes_are_fetchable() {
        assert!(is_http_url("https://example.com"));
        assert!(is_http_url("http://example.com"));
        assert!(!is_http_url("ftp://example.com/a"));
        assert!(!is_http_url("/srv/a.md"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: ContentResult<()> = cancellable(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(ContentError::Cancelled)));
    }
}
