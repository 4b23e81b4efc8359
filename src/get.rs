//! Content retrieval for the `content-sync get` command.
//!
//! A record is addressed either by its public id or by `namespace/slug`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::error::{ContentError, ContentResult};
use crate::models::{ContentTypeText, PublicId};
use crate::writer::ContentWriter;

/// How the command line named a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Public(PublicId),
    Slug { namespace: String, slug: String },
}

impl ContentRef {
    /// Parse `<public-id>` or `<namespace>/<slug>`.
    pub fn parse(raw: &str) -> ContentResult<Self> {
        if let Ok(id) = PublicId::parse(raw) {
            return Ok(ContentRef::Public(id));
        }
        match raw.split_once('/') {
            Some((namespace, slug)) if !namespace.is_empty() && !slug.is_empty() => {
                Ok(ContentRef::Slug {
                    namespace: namespace.to_string(),
                    slug: slug.to_string(),
                })
            }
            _ => Err(ContentError::validation(format!(
                "'{}' is neither a public id nor namespace/slug",
                raw
            ))),
        }
    }
}

pub async fn get_content(
    writer: &ContentWriter,
    target: &ContentRef,
) -> ContentResult<ContentTypeText> {
    match target {
        ContentRef::Public(id) => writer.get_text(id).await,
        ContentRef::Slug { namespace, slug } => writer.get_text_by_slug(namespace, slug).await,
    }
}

/// CLI entry point: print one record as text or JSON.
pub async fn run_get(config: &Config, target: &str, json: bool) -> Result<()> {
    let target = ContentRef::parse(target)?;
    let pool = db::connect(config).await?;
    let writer = ContentWriter::new(pool.clone());
    let result = get_content(&writer, &target).await;
    pool.close().await;
    let content = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&content)?);
        return Ok(());
    }

    let summary = &content.summary;
    println!("--- Content ---");
    println!("public_id:    {}", content.public_id());
    println!("namespace:    {}", summary.namespace);
    println!("slug:         {}", summary.slug);
    println!("title:        {}", summary.title);
    if let Some(ref s) = summary.summary {
        println!("summary:      {}", s);
    }
    println!("format:       {}", content.format);
    println!("source_type:  {}", content.source_type);
    if let Some(ref path) = summary.extern_path {
        println!("extern_path:  {}", path);
    }
    if !summary.version_cookie.is_empty() {
        println!("version:      {}", summary.version_cookie);
    }
    println!(
        "last_sync:    {}",
        summary
            .last_sync
            .map(format_ts_iso)
            .unwrap_or_else(|| "never".to_string())
    );
    println!("revision:     {}", summary.last_updated);
    for c in &summary.contributors {
        println!(
            "contributor:  {} ({}, #{})",
            c.display_name, c.role, c.credit_order
        );
    }
    println!();

    println!("--- Text ---");
    println!("{}", content.text);

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
