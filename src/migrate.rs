use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Identity records shared by content and persons
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pub_id TEXT NOT NULL UNIQUE,
            last_updated INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS persons (
            id INTEGER PRIMARY KEY,
            display_name TEXT NOT NULL,
            FOREIGN KEY (id) REFERENCES entities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_summary (
            id INTEGER PRIMARY KEY,
            namespace TEXT NOT NULL,
            slug TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            summary TEXT,
            extern_path TEXT,
            version_cookie TEXT NOT NULL DEFAULT '',
            last_sync INTEGER,
            UNIQUE(namespace, slug),
            FOREIGN KEY (id) REFERENCES entities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_type_text (
            id INTEGER PRIMARY KEY,
            format TEXT NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            source_type TEXT NOT NULL DEFAULT 'NONE',
            FOREIGN KEY (id) REFERENCES content_summary(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // seq preserves insertion order among equal credit orders
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributors (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id INTEGER NOT NULL,
            person_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            credit_order INTEGER NOT NULL,
            FOREIGN KEY (content_id) REFERENCES content_summary(id),
            FOREIGN KEY (person_id) REFERENCES persons(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contributors_content_id ON contributors(content_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_summary_namespace ON content_summary(namespace)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
