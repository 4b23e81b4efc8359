//! Transactional writer for text content records.
//!
//! Each public operation is one transaction: statements run in the fixed
//! order identity → summary → extension → contributors, and the whole unit
//! either commits or rolls back on the first failure.
//!
//! Field updates and contributor replacement are deliberately separate
//! transactions. A caller that needs both applied atomically has to
//! coordinate above this layer; between the two commits a reader can see
//! new fields with the old contributor list.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, warn};

use crate::error::{ContentError, ContentResult};
use crate::identity;
use crate::models::{
    is_externally_managed, ContentTypeText, InternalId, NewContributor, PublicId, SourceType,
    TextDraft, TextPatch, CONTENT_TYPE_TEXT,
};
use crate::queries::{self, SummaryRow, TextLookup};

#[derive(Clone)]
pub struct ContentWriter {
    pool: SqlitePool,
}

impl ContentWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create entity, summary, text extension and contributors in one unit.
    ///
    /// Externally managed drafts are stored with an empty body; only
    /// synchronization fills it in.
    pub async fn create_text(&self, draft: &TextDraft) -> ContentResult<ContentTypeText> {
        validate_draft(draft)?;

        let mut tx = self.pool.begin().await?;
        let result = create_in_tx(&mut tx, draft).await;
        let created = finish(tx, result, "create_text").await?;

        debug!(
            public_id = %created.public_id(),
            namespace = %created.summary.namespace,
            slug = %created.summary.slug,
            "created text content"
        );
        Ok(created)
    }

    /// Apply the set fields of `patch` to the record with `public_id`.
    pub async fn update_text_fields(
        &self,
        public_id: &PublicId,
        patch: &TextPatch,
    ) -> ContentResult<ContentTypeText> {
        self.update_fields_at(TextLookup::Public(public_id), patch).await
    }

    /// Same as [`update_text_fields`](Self::update_text_fields), addressed by
    /// namespace and slug. A patch may rename the slug it was addressed by.
    pub async fn update_text_fields_by_slug(
        &self,
        namespace: &str,
        slug: &str,
        patch: &TextPatch,
    ) -> ContentResult<ContentTypeText> {
        self.update_fields_at(TextLookup::NamespaceSlug(namespace, slug), patch)
            .await
    }

    /// Replace the whole contributor list, preserving the given order.
    pub async fn update_contributors(
        &self,
        public_id: &PublicId,
        contributors: &[NewContributor],
    ) -> ContentResult<ContentTypeText> {
        self.replace_contributors_at(TextLookup::Public(public_id), contributors)
            .await
    }

    pub async fn update_contributors_by_slug(
        &self,
        namespace: &str,
        slug: &str,
        contributors: &[NewContributor],
    ) -> ContentResult<ContentTypeText> {
        self.replace_contributors_at(TextLookup::NamespaceSlug(namespace, slug), contributors)
            .await
    }

    async fn update_fields_at(
        &self,
        lookup: TextLookup<'_>,
        patch: &TextPatch,
    ) -> ContentResult<ContentTypeText> {
        let mut tx = self.pool.begin().await?;
        let result = update_fields_in_tx(&mut tx, lookup, patch).await;
        let updated = finish(tx, result, "update_text_fields").await?;

        debug!(public_id = %updated.public_id(), "updated text fields");
        Ok(updated)
    }

    async fn replace_contributors_at(
        &self,
        lookup: TextLookup<'_>,
        contributors: &[NewContributor],
    ) -> ContentResult<ContentTypeText> {
        let mut tx = self.pool.begin().await?;
        let result = replace_contributors_in_tx(&mut tx, lookup, contributors).await;
        let updated = finish(tx, result, "update_contributors").await?;

        debug!(
            public_id = %updated.public_id(),
            count = contributors.len(),
            "replaced contributors"
        );
        Ok(updated)
    }

    /// Write back a synchronized body and stamp `last_sync`.
    ///
    /// Reserved for the synchronization path. When `version_cookie` is given
    /// it replaces the stored fingerprint.
    pub async fn update_text_only(
        &self,
        public_id: &PublicId,
        text: &str,
        version_cookie: Option<&str>,
    ) -> ContentResult<ContentTypeText> {
        let mut tx = self.pool.begin().await?;
        let result =
            update_text_in_tx(&mut tx, TextLookup::Public(public_id), text, version_cookie).await;
        let updated = finish(tx, result, "update_text_only").await?;

        debug!(
            public_id = %public_id,
            bytes = text.len(),
            version_cookie = version_cookie.unwrap_or(""),
            "stored synchronized text"
        );
        Ok(updated)
    }

    /// Remove a record and its dependent rows. Used for stale source files.
    pub(crate) async fn delete_text(&self, id: InternalId) -> ContentResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = delete_in_tx(&mut tx, id).await;
        finish(tx, result, "delete_text").await
    }

    pub async fn get_text(&self, public_id: &PublicId) -> ContentResult<ContentTypeText> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_text(&mut conn, TextLookup::Public(public_id))
            .await?
            .ok_or_else(|| ContentError::not_found(format!("content {}", public_id)))
    }

    pub async fn get_text_by_slug(
        &self,
        namespace: &str,
        slug: &str,
    ) -> ContentResult<ContentTypeText> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_text(&mut conn, TextLookup::NamespaceSlug(namespace, slug))
            .await?
            .ok_or_else(|| ContentError::not_found(format!("content {}/{}", namespace, slug)))
    }

    pub(crate) async fn get_text_by_internal_id(
        &self,
        id: InternalId,
    ) -> ContentResult<ContentTypeText> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_text(&mut conn, TextLookup::Internal(id))
            .await?
            .ok_or_else(|| ContentError::not_found("content record vanished"))
    }
}

/// Commit on success, roll back and surface the first error otherwise.
async fn finish<T>(
    tx: Transaction<'_, Sqlite>,
    result: ContentResult<T>,
    operation: &str,
) -> ContentResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if is_store_failure(&err) {
                warn!(operation, error = %err, "rolling back transaction");
            } else {
                debug!(operation, error = %err, "rolling back transaction");
            }
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Caller mistakes roll back quietly; only store failures are worth a warning.
fn is_store_failure(err: &ContentError) -> bool {
    matches!(err, ContentError::Persistence(_))
}

fn validate_draft(draft: &TextDraft) -> ContentResult<()> {
    if draft.namespace.trim().is_empty() {
        return Err(ContentError::validation("namespace must not be empty"));
    }
    if draft.slug.trim().is_empty() {
        return Err(ContentError::validation("slug must not be empty"));
    }
    Ok(())
}

async fn create_in_tx(
    conn: &mut SqliteConnection,
    draft: &TextDraft,
) -> ContentResult<ContentTypeText> {
    if draft.source_type == SourceType::Gitlab {
        if let Some(path) = draft.extern_path.as_deref().filter(|p| !p.is_empty()) {
            ensure_gitlab_path_free(conn, &draft.namespace, path, None).await?;
        }
    }

    let entity = identity::allocate(conn).await?;
    let id = entity.internal_id;

    queries::insert_summary(
        conn,
        id,
        &SummaryRow {
            namespace: &draft.namespace,
            slug: &draft.slug,
            content_type: CONTENT_TYPE_TEXT,
            title: &draft.title,
            summary: draft.summary.as_deref(),
            extern_path: draft.extern_path.as_deref(),
        },
    )
    .await?;

    let text = if is_externally_managed(draft.extern_path.as_deref(), draft.source_type) {
        ""
    } else {
        draft.text.as_deref().unwrap_or("")
    };
    queries::insert_text_extension(conn, id, &draft.format, text, draft.source_type).await?;

    queries::insert_contributors(conn, id, &draft.contributors).await?;

    load(conn, TextLookup::Internal(id)).await
}

async fn update_fields_in_tx(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
    patch: &TextPatch,
) -> ContentResult<ContentTypeText> {
    let mut current = load(conn, lookup).await?;
    let was_managed = current.is_externally_managed();
    let (old_namespace, old_path) = (
        current.summary.namespace.clone(),
        current.summary.extern_path.clone(),
    );

    if let Some(ref requested) = patch.content_type {
        if requested != &current.summary.content_type {
            return Err(ContentError::validation(format!(
                "content type is immutable ('{}' cannot become '{}')",
                current.summary.content_type, requested
            )));
        }
    }

    let s = &mut current.summary;
    if let Some(ref title) = patch.title {
        s.title = title.clone();
    }
    if let Some(ref summary) = patch.summary {
        s.summary = Some(summary.clone());
    }
    if let Some(ref path) = patch.extern_path {
        s.extern_path = if path.is_empty() { None } else { Some(path.clone()) };
    }
    if let Some(ref namespace) = patch.namespace {
        if namespace.trim().is_empty() {
            return Err(ContentError::validation("namespace must not be empty"));
        }
        s.namespace = namespace.clone();
    }
    if let Some(ref slug) = patch.slug {
        if slug.trim().is_empty() {
            return Err(ContentError::validation("slug must not be empty"));
        }
        s.slug = slug.clone();
    }
    if let Some(ref format) = patch.format {
        current.format = format.clone();
    }
    if let Some(ref text) = patch.text {
        if was_managed || current.is_externally_managed() {
            return Err(ContentError::validation(
                "text of an externally managed record can only change through synchronization",
            ));
        }
        current.text = text.clone();
    }

    if current.source_type == SourceType::Gitlab
        && (current.summary.namespace != old_namespace || current.summary.extern_path != old_path)
    {
        if let Some(path) = current.summary.extern_path.as_deref() {
            let namespace = current.summary.namespace.as_str();
            ensure_gitlab_path_free(conn, namespace, path, Some(current.internal_id())).await?;
        }
    }

    queries::update_fields(conn, &current).await?;
    identity::touch(conn, current.internal_id()).await?;

    load(conn, TextLookup::Internal(current.internal_id())).await
}

async fn replace_contributors_in_tx(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
    contributors: &[NewContributor],
) -> ContentResult<ContentTypeText> {
    let id = resolve(conn, lookup).await?;

    queries::delete_contributors(conn, id).await?;
    queries::insert_contributors(conn, id, contributors).await?;
    identity::touch(conn, id).await?;

    load(conn, TextLookup::Internal(id)).await
}

async fn update_text_in_tx(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
    text: &str,
    version_cookie: Option<&str>,
) -> ContentResult<ContentTypeText> {
    let id = resolve(conn, lookup).await?;

    queries::update_text_only(conn, id, text, version_cookie).await?;
    identity::touch(conn, id).await?;

    load(conn, TextLookup::Internal(id)).await
}

async fn delete_in_tx(conn: &mut SqliteConnection, id: InternalId) -> ContentResult<()> {
    queries::delete_content(conn, id).await?;
    identity::remove(conn, id).await
}

/// One repository file maps to at most one record per namespace.
async fn ensure_gitlab_path_free(
    conn: &mut SqliteConnection,
    namespace: &str,
    extern_path: &str,
    except: Option<InternalId>,
) -> ContentResult<()> {
    if queries::gitlab_path_taken(conn, namespace, extern_path, except).await? {
        return Err(ContentError::Conflict(format!(
            "'{}' is already imported into namespace '{}'",
            extern_path, namespace
        )));
    }
    Ok(())
}

async fn resolve(conn: &mut SqliteConnection, lookup: TextLookup<'_>) -> ContentResult<InternalId> {
    queries::resolve_id(conn, lookup)
        .await?
        .ok_or_else(|| ContentError::not_found(lookup.to_string()))
}

async fn load(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
) -> ContentResult<ContentTypeText> {
    queries::fetch_text(conn, lookup)
        .await?
        .ok_or_else(|| ContentError::not_found(lookup.to_string()))
}
