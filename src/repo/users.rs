use std::collections::HashMap;

use sqlx::PgPool;
use sqlx::types::Json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub did: String,
    pub first_known_as: String,
    pub also_known_as_full: Vec<String>,
}

/// `true` if a row for `did` already exists. Used to decide whether a
/// directory lookup is even needed — existence is checked per request
/// (not batched), shifting load from the directory onto the local database.
pub async fn exists(pool: &PgPool, did: &str) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE did = $1)")
        .bind(did)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// One multi-row `UNNEST`-based upsert per flush. The handle-list widening
/// invariant is enforced in the SQL itself (`CASE WHEN cardinality(...)`) so
/// that it stays atomic per row even when batches from different
/// persistence workers interleave. `also_known_as_full` is variable-length
/// per row, so it travels as one `Json<Vec<String>>` per row — `json[]` —
/// and is unpacked back to `text[]` in the `SELECT` list, the same trick
/// `posts::insert_batch` uses for `langs`.
///
/// Postgres rejects a multi-row `ON CONFLICT DO UPDATE` that targets the
/// same row twice in one statement, so a same-`did` duplicate within a batch
/// (the per-request existence check can race two commits from the same
/// author) is first collapsed to the widest handle list seen for that `did`.
pub async fn upsert_batch(pool: &PgPool, rows: &[UserRow]) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut by_did: HashMap<&str, &UserRow> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_did
            .entry(row.did.as_str())
            .and_modify(|existing| {
                if row.also_known_as_full.len() > existing.also_known_as_full.len() {
                    *existing = row;
                }
            })
            .or_insert(row);
    }
    let deduped: Vec<&UserRow> = by_did.into_values().collect();

    let dids: Vec<&str> = deduped.iter().map(|r| r.did.as_str()).collect();
    let first_known_as: Vec<&str> = deduped.iter().map(|r| r.first_known_as.as_str()).collect();
    let also_known_as_full: Vec<Json<&Vec<String>>> = deduped
        .iter()
        .map(|r| Json(&r.also_known_as_full))
        .collect();

    let result = sqlx::query(
        r#"WITH input AS (
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::json[])
                AS t(did, first_known_as, also_known_as_full)
        )
        INSERT INTO users (did, first_known_as, also_known_as_full)
        SELECT did, first_known_as, ARRAY(SELECT json_array_elements_text(also_known_as_full))
        FROM input
        ON CONFLICT (did) DO UPDATE
            SET also_known_as_full = CASE
                WHEN cardinality(EXCLUDED.also_known_as_full) > cardinality(users.also_known_as_full)
                THEN EXCLUDED.also_known_as_full
                ELSE users.also_known_as_full
            END"#,
    )
    .bind(&dids)
    .bind(&first_known_as)
    .bind(&also_known_as_full)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
