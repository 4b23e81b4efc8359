//! Minimal person registry.
//!
//! Contributors reference persons by public id, so persons must exist
//! before they can be credited. Only creation and lookup are provided.

use sqlx::{Row, SqlitePool};

use crate::error::{ContentError, ContentResult};
use crate::identity;
use crate::models::{Person, PublicId};

pub async fn create_person(pool: &SqlitePool, display_name: &str) -> ContentResult<Person> {
    if display_name.trim().is_empty() {
        return Err(ContentError::validation("display name must not be empty"));
    }

    let mut tx = pool.begin().await?;
    let entity = identity::allocate(&mut *tx).await?;

    sqlx::query("INSERT INTO persons (id, display_name) VALUES (?, ?)")
        .bind(entity.internal_id.get())
        .bind(display_name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Person {
        public_id: entity.public_id,
        display_name: display_name.to_string(),
    })
}

pub async fn get_person(pool: &SqlitePool, public_id: &PublicId) -> ContentResult<Person> {
    let row = sqlx::query(
        "SELECT p.display_name FROM persons p JOIN entities e ON e.id = p.id WHERE e.pub_id = ?",
    )
    .bind(public_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ContentError::not_found(format!("person {}", public_id)))?;

    Ok(Person {
        public_id: *public_id,
        display_name: row.get("display_name"),
    })
}
