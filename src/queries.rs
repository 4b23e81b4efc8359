//! Row-level statements over the content schema.
//!
//! Every function runs on a caller-supplied connection, which is normally
//! the inside of a transaction owned by [`crate::writer`]. Nothing here
//! begins, commits or rolls back.

use std::fmt;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{ContentError, ContentResult};
use crate::models::{
    Contributor, ContentSummary, ContentTypeText, InternalId, NewContributor, PublicId, SourceType,
};

/// How a single text record is addressed.
#[derive(Debug, Clone, Copy)]
pub enum TextLookup<'a> {
    Public(&'a PublicId),
    NamespaceSlug(&'a str, &'a str),
    Internal(InternalId),
}

impl fmt::Display for TextLookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextLookup::Public(id) => write!(f, "content {}", id),
            TextLookup::NamespaceSlug(namespace, slug) => {
                write!(f, "content {}/{}", namespace, slug)
            }
            TextLookup::Internal(id) => write!(f, "content #{}", id.get()),
        }
    }
}

/// Columns of `content_summary` written at creation time.
pub struct SummaryRow<'a> {
    pub namespace: &'a str,
    pub slug: &'a str,
    pub content_type: &'a str,
    pub title: &'a str,
    pub summary: Option<&'a str>,
    pub extern_path: Option<&'a str>,
}

/// A stored, source-managed record as seen by reconciliation.
#[derive(Debug, Clone)]
pub struct SourcedRecord {
    pub id: InternalId,
    pub public_id: PublicId,
    pub extern_path: String,
    pub version_cookie: String,
}

const TEXT_COLUMNS: &str = r#"
    SELECT cs.id, e.pub_id, e.last_updated, cs.title, cs.summary, cs.namespace, cs.slug,
           cs.type, cs.extern_path, cs.last_sync, cs.version_cookie,
           ctt.format, ctt.text, ctt.source_type
    FROM content_summary cs
    JOIN entities e ON e.id = cs.id
    JOIN content_type_text ctt ON ctt.id = cs.id
"#;

pub async fn insert_summary(
    conn: &mut SqliteConnection,
    id: InternalId,
    row: &SummaryRow<'_>,
) -> ContentResult<()> {
    sqlx::query(
        r#"
        INSERT INTO content_summary (id, namespace, slug, type, title, summary, extern_path, version_cookie)
        VALUES (?, ?, ?, ?, ?, ?, ?, '')
        "#,
    )
    .bind(id.get())
    .bind(row.namespace)
    .bind(row.slug)
    .bind(row.content_type)
    .bind(row.title)
    .bind(row.summary)
    .bind(row.extern_path)
    .execute(&mut *conn)
    .await
    .map_err(|e| slug_conflict(e, row.namespace, row.slug))?;
    Ok(())
}

pub async fn insert_text_extension(
    conn: &mut SqliteConnection,
    id: InternalId,
    format: &str,
    text: &str,
    source_type: SourceType,
) -> ContentResult<()> {
    sqlx::query(
        "INSERT INTO content_type_text (id, format, text, source_type) VALUES (?, ?, ?, ?)",
    )
    .bind(id.get())
    .bind(format)
    .bind(text)
    .bind(source_type.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert contributors in the given order. Fails on the first unknown person.
pub async fn insert_contributors(
    conn: &mut SqliteConnection,
    content_id: InternalId,
    contributors: &[NewContributor],
) -> ContentResult<()> {
    for contrib in contributors {
        let result = sqlx::query(
            r#"
            INSERT INTO contributors (content_id, person_id, role, credit_order)
            SELECT ?, p.id, ?, ?
            FROM persons p JOIN entities e ON e.id = p.id
            WHERE e.pub_id = ?
            "#,
        )
        .bind(content_id.get())
        .bind(&contrib.role)
        .bind(contrib.credit_order)
        .bind(contrib.person.to_string())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ContentError::validation(format!(
                "contributor references unknown person {}",
                contrib.person
            )));
        }
    }
    Ok(())
}

pub async fn delete_contributors(
    conn: &mut SqliteConnection,
    content_id: InternalId,
) -> ContentResult<()> {
    sqlx::query("DELETE FROM contributors WHERE content_id = ?")
        .bind(content_id.get())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Overwrite the user-editable columns of a record.
pub async fn update_fields(
    conn: &mut SqliteConnection,
    current: &ContentTypeText,
) -> ContentResult<()> {
    let s = &current.summary;
    sqlx::query(
        r#"
        UPDATE content_summary
        SET title = ?, summary = ?, extern_path = ?, namespace = ?, slug = ?
        WHERE id = ?
        "#,
    )
    .bind(&s.title)
    .bind(&s.summary)
    .bind(&s.extern_path)
    .bind(&s.namespace)
    .bind(&s.slug)
    .bind(s.id.get())
    .execute(&mut *conn)
    .await
    .map_err(|e| slug_conflict(e, &s.namespace, &s.slug))?;

    sqlx::query("UPDATE content_type_text SET format = ?, text = ? WHERE id = ?")
        .bind(&current.format)
        .bind(&current.text)
        .bind(s.id.get())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Write a synchronized body. `last_sync` comes from the store's clock.
pub async fn update_text_only(
    conn: &mut SqliteConnection,
    id: InternalId,
    text: &str,
    version_cookie: Option<&str>,
) -> ContentResult<()> {
    sqlx::query("UPDATE content_type_text SET text = ? WHERE id = ?")
        .bind(text)
        .bind(id.get())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        UPDATE content_summary
        SET last_sync = CAST(strftime('%s', 'now') AS INTEGER),
            version_cookie = COALESCE(?, version_cookie)
        WHERE id = ?
        "#,
    )
    .bind(version_cookie)
    .bind(id.get())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_content(conn: &mut SqliteConnection, id: InternalId) -> ContentResult<()> {
    delete_contributors(conn, id).await?;
    sqlx::query("DELETE FROM content_type_text WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM content_summary WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Internal id of the content record `lookup` names, if there is one.
///
/// Only content rows match; a person's public id resolves to nothing.
pub async fn resolve_id(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
) -> ContentResult<Option<InternalId>> {
    let id: Option<i64> = match lookup {
        TextLookup::Public(pub_id) => {
            sqlx::query_scalar(
                "SELECT cs.id FROM content_summary cs JOIN entities e ON e.id = cs.id WHERE e.pub_id = ?",
            )
            .bind(pub_id.to_string())
            .fetch_optional(&mut *conn)
            .await?
        }
        TextLookup::NamespaceSlug(namespace, slug) => {
            sqlx::query_scalar("SELECT id FROM content_summary WHERE namespace = ? AND slug = ?")
                .bind(namespace)
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?
        }
        TextLookup::Internal(id) => {
            sqlx::query_scalar("SELECT id FROM content_summary WHERE id = ?")
                .bind(id.get())
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(id.map(InternalId::from_row))
}

/// True when another GitLab-sourced record of `namespace` already points at
/// `extern_path`. `except` excludes the record being edited.
pub async fn gitlab_path_taken(
    conn: &mut SqliteConnection,
    namespace: &str,
    extern_path: &str,
    except: Option<InternalId>,
) -> ContentResult<bool> {
    let taken: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM content_summary cs
            JOIN content_type_text ctt ON ctt.id = cs.id
            WHERE cs.namespace = ? AND cs.extern_path = ? AND ctt.source_type = ? AND cs.id != ?
        )
        "#,
    )
    .bind(namespace)
    .bind(extern_path)
    .bind(SourceType::Gitlab.as_str())
    .bind(except.map(InternalId::get).unwrap_or(-1))
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken != 0)
}

/// Load a text record with its ordered contributors.
pub async fn fetch_text(
    conn: &mut SqliteConnection,
    lookup: TextLookup<'_>,
) -> ContentResult<Option<ContentTypeText>> {
    let row = match lookup {
        TextLookup::Public(pub_id) => {
            sqlx::query(&format!("{} WHERE e.pub_id = ?", TEXT_COLUMNS))
                .bind(pub_id.to_string())
                .fetch_optional(&mut *conn)
                .await?
        }
        TextLookup::NamespaceSlug(namespace, slug) => {
            sqlx::query(&format!(
                "{} WHERE cs.namespace = ? AND cs.slug = ?",
                TEXT_COLUMNS
            ))
            .bind(namespace)
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?
        }
        TextLookup::Internal(id) => {
            sqlx::query(&format!("{} WHERE cs.id = ?", TEXT_COLUMNS))
                .bind(id.get())
                .fetch_optional(&mut *conn)
                .await?
        }
    };

    let Some(row) = row else {
        return Ok(None);
    };

    let mut text = text_from_row(&row)?;
    text.summary.contributors = fetch_contributors(conn, text.summary.id).await?;
    Ok(Some(text))
}

pub async fn fetch_contributors(
    conn: &mut SqliteConnection,
    content_id: InternalId,
) -> ContentResult<Vec<Contributor>> {
    let rows = sqlx::query(
        r#"
        SELECT e.pub_id, p.display_name, c.role, c.credit_order
        FROM contributors c
        JOIN persons p ON p.id = c.person_id
        JOIN entities e ON e.id = p.id
        WHERE c.content_id = ?
        ORDER BY c.credit_order ASC, c.seq ASC
        "#,
    )
    .bind(content_id.get())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Contributor {
                person: decode_public_id(row.get("pub_id"))?,
                display_name: row.get("display_name"),
                role: row.get("role"),
                credit_order: row.get("credit_order"),
            })
        })
        .collect()
}

/// Externally sourced records of a namespace, keyed material for the diff.
pub async fn list_sourced(
    conn: &mut SqliteConnection,
    namespace: &str,
    source_type: SourceType,
) -> ContentResult<Vec<SourcedRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT cs.id, e.pub_id, cs.extern_path, cs.version_cookie
        FROM content_summary cs
        JOIN entities e ON e.id = cs.id
        JOIN content_type_text ctt ON ctt.id = cs.id
        WHERE cs.namespace = ? AND ctt.source_type = ? AND cs.extern_path IS NOT NULL
        "#,
    )
    .bind(namespace)
    .bind(source_type.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SourcedRecord {
                id: InternalId::from_row(row.get("id")),
                public_id: decode_public_id(row.get("pub_id"))?,
                extern_path: row.get("extern_path"),
                version_cookie: row.get("version_cookie"),
            })
        })
        .collect()
}

fn text_from_row(row: &SqliteRow) -> ContentResult<ContentTypeText> {
    let source_type: String = row.get("source_type");
    let source_type = source_type.parse::<SourceType>().map_err(|_| {
        ContentError::Persistence(sqlx::Error::Decode(
            format!("unknown source_type '{}'", source_type).into(),
        ))
    })?;

    Ok(ContentTypeText {
        summary: ContentSummary {
            id: InternalId::from_row(row.get("id")),
            public_id: decode_public_id(row.get("pub_id"))?,
            last_updated: row.get("last_updated"),
            title: row.get("title"),
            summary: row.get("summary"),
            namespace: row.get("namespace"),
            slug: row.get("slug"),
            content_type: row.get("type"),
            version_cookie: row.get("version_cookie"),
            extern_path: row.get("extern_path"),
            last_sync: row.get("last_sync"),
            contributors: Vec::new(),
        },
        format: row.get("format"),
        text: row.get("text"),
        source_type,
    })
}

fn decode_public_id(raw: String) -> ContentResult<PublicId> {
    PublicId::parse(&raw).map_err(|_| {
        ContentError::Persistence(sqlx::Error::Decode(
            format!("stored pub_id '{}' is not a uuid", raw).into(),
        ))
    })
}

fn slug_conflict(err: sqlx::Error, namespace: &str, slug: &str) -> ContentError {
    match ContentError::from(err) {
        ContentError::Conflict(_) => ContentError::Conflict(format!(
            "slug '{}' already used in namespace '{}'",
            slug, namespace
        )),
        other => other,
    }
}
