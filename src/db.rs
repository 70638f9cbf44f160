//! Connection pool and schema management.
//!
//! No migration framework: the four tables are created with
//! `CREATE TABLE IF NOT EXISTS` on startup, matching the reference
//! deployment's idempotent bring-up rather than a versioned migration chain.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// `max_connections` is `persistence_workers + 1` — one connection per
/// persistence worker's flush path, plus one left free for schema work.
pub async fn create_pool(database_url: &str, persistence_workers: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(persistence_workers + 1)
        .connect(database_url)
        .await
}

/// Create the four tables if absent. When `reset` is set each table is
/// dropped first — a development-time switch only, never used in normal
/// operation.
pub async fn ensure_schema(pool: &PgPool, reset: bool) -> Result<(), sqlx::Error> {
    if reset {
        for table in ["users", "posts", "reposts", "likes"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(pool)
                .await?;
        }
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            did TEXT PRIMARY KEY,
            first_known_as TEXT,
            also_known_as_full TEXT[]
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS posts (
            cid TEXT PRIMARY KEY,
            created_at TIMESTAMPTZ,
            did TEXT,
            commit TEXT,
            text TEXT,
            langs TEXT[],
            facets JSONB,
            has_embed BOOLEAN,
            embed_type TEXT,
            embed_refs TEXT[],
            external_uri TEXT,
            has_record BOOLEAN,
            record_cid TEXT,
            record_uri TEXT,
            is_reply BOOLEAN,
            reply_root_cid TEXT,
            reply_root_uri TEXT,
            reply_parent_cid TEXT,
            reply_parent_uri TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS reposts (
            cid TEXT PRIMARY KEY,
            created_at TIMESTAMPTZ,
            did TEXT,
            commit TEXT,
            subject_cid TEXT,
            subject_uri TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS likes (
            cid TEXT PRIMARY KEY,
            created_at TIMESTAMPTZ,
            did TEXT,
            commit TEXT,
            subject_cid TEXT,
            subject_uri TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
