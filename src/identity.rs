//! Identity allocation for content-bearing records.
//!
//! Every content record and person owns exactly one row in `entities`.
//! The row is created once inside the caller's transaction and its
//! `last_updated` counter is bumped whenever a dependent row changes.
//! `AUTOINCREMENT` guarantees internal ids are never handed out twice, and
//! public ids are fresh UUIDs.

use sqlx::SqliteConnection;

use crate::error::ContentResult;
use crate::models::{Entity, InternalId, PublicId};

/// Insert a new entity row and return its identifiers.
pub async fn allocate(conn: &mut SqliteConnection) -> ContentResult<Entity> {
    let public_id = PublicId::generate();

    let result = sqlx::query("INSERT INTO entities (pub_id, last_updated) VALUES (?, 1)")
        .bind(public_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(Entity {
        internal_id: InternalId::from_row(result.last_insert_rowid()),
        public_id,
        last_updated: 1,
    })
}

/// Bump the revision counter of an entity.
pub async fn touch(conn: &mut SqliteConnection, id: InternalId) -> ContentResult<()> {
    sqlx::query("UPDATE entities SET last_updated = last_updated + 1 WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn remove(conn: &mut SqliteConnection, id: InternalId) -> ContentResult<()> {
    sqlx::query("DELETE FROM entities WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
