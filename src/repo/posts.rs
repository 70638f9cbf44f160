use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub cid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub did: String,
    pub commit: String,
    pub text: String,
    pub langs: Vec<String>,
    pub facets: Option<serde_json::Value>,
    pub has_embed: bool,
    pub embed_type: String,
    pub embed_refs: Vec<String>,
    pub external_uri: Option<String>,
    pub has_record: bool,
    pub record_cid: Option<String>,
    pub record_uri: Option<String>,
    pub is_reply: bool,
    pub reply_root_cid: Option<String>,
    pub reply_root_uri: Option<String>,
    pub reply_parent_cid: Option<String>,
    pub reply_parent_uri: Option<String>,
}

/// Batched insert, idempotent by `cid`: a duplicate content identifier is a
/// no-op rather than an error, since the firehose can redeliver a commit
/// across a reconnect.
///
/// One multi-row statement per flush rather than N single-row round trips:
/// every column is passed as a same-length array and zipped server-side via
/// `UNNEST`. `langs` and `embed_refs` are variable-length per row, so a true
/// `text[][]` parameter can't carry them (Postgres arrays must be
/// rectangular); each instead travels as one `Json<Vec<String>>` per row —
/// `json[]` — and is unpacked back to `text[]` with
/// `json_array_elements_text` in the `SELECT` list. `facets` rides the same
/// `json[]` parameter type and is cast to the column's `jsonb` on the way in.
pub async fn insert_batch(pool: &PgPool, rows: &[PostRow]) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let cids: Vec<&str> = rows.iter().map(|r| r.cid.as_str()).collect();
    let created_ats: Vec<Option<DateTime<Utc>>> = rows.iter().map(|r| r.created_at).collect();
    let dids: Vec<&str> = rows.iter().map(|r| r.did.as_str()).collect();
    let commits: Vec<&str> = rows.iter().map(|r| r.commit.as_str()).collect();
    let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
    let langs: Vec<Json<&Vec<String>>> = rows.iter().map(|r| Json(&r.langs)).collect();
    let facets: Vec<Option<Json<&serde_json::Value>>> =
        rows.iter().map(|r| r.facets.as_ref().map(Json)).collect();
    let has_embeds: Vec<bool> = rows.iter().map(|r| r.has_embed).collect();
    let embed_types: Vec<&str> = rows.iter().map(|r| r.embed_type.as_str()).collect();
    let embed_refs: Vec<Json<&Vec<String>>> = rows.iter().map(|r| Json(&r.embed_refs)).collect();
    let external_uris: Vec<Option<&str>> = rows.iter().map(|r| r.external_uri.as_deref()).collect();
    let has_records: Vec<bool> = rows.iter().map(|r| r.has_record).collect();
    let record_cids: Vec<Option<&str>> = rows.iter().map(|r| r.record_cid.as_deref()).collect();
    let record_uris: Vec<Option<&str>> = rows.iter().map(|r| r.record_uri.as_deref()).collect();
    let is_replies: Vec<bool> = rows.iter().map(|r| r.is_reply).collect();
    let reply_root_cids: Vec<Option<&str>> = rows.iter().map(|r| r.reply_root_cid.as_deref()).collect();
    let reply_root_uris: Vec<Option<&str>> = rows.iter().map(|r| r.reply_root_uri.as_deref()).collect();
    let reply_parent_cids: Vec<Option<&str>> = rows.iter().map(|r| r.reply_parent_cid.as_deref()).collect();
    let reply_parent_uris: Vec<Option<&str>> = rows.iter().map(|r| r.reply_parent_uri.as_deref()).collect();

    let result = sqlx::query(
        r#"WITH input AS (
            SELECT * FROM UNNEST(
                $1::text[], $2::timestamptz[], $3::text[], $4::text[], $5::text[],
                $6::json[], $7::json[], $8::bool[], $9::text[], $10::json[],
                $11::text[], $12::bool[], $13::text[], $14::text[], $15::bool[],
                $16::text[], $17::text[], $18::text[], $19::text[]
            ) AS t(
                cid, created_at, did, commit, text, langs, facets, has_embed,
                embed_type, embed_refs, external_uri, has_record, record_cid,
                record_uri, is_reply, reply_root_cid, reply_root_uri,
                reply_parent_cid, reply_parent_uri
            )
        )
        INSERT INTO posts (
            cid, created_at, did, commit, text, langs, facets, has_embed,
            embed_type, embed_refs, external_uri, has_record, record_cid,
            record_uri, is_reply, reply_root_cid, reply_root_uri,
            reply_parent_cid, reply_parent_uri
        )
        SELECT
            cid, created_at, did, commit, text,
            ARRAY(SELECT json_array_elements_text(langs)),
            facets::jsonb, has_embed, embed_type,
            ARRAY(SELECT json_array_elements_text(embed_refs)),
            external_uri, has_record, record_cid, record_uri, is_reply,
            reply_root_cid, reply_root_uri, reply_parent_cid, reply_parent_uri
        FROM input
        ON CONFLICT (cid) DO NOTHING"#,
    )
    .bind(&cids)
    .bind(&created_ats)
    .bind(&dids)
    .bind(&commits)
    .bind(&texts)
    .bind(&langs)
    .bind(&facets)
    .bind(&has_embeds)
    .bind(&embed_types)
    .bind(&embed_refs)
    .bind(&external_uris)
    .bind(&has_records)
    .bind(&record_cids)
    .bind(&record_uris)
    .bind(&is_replies)
    .bind(&reply_root_cids)
    .bind(&reply_root_uris)
    .bind(&reply_parent_cids)
    .bind(&reply_parent_uris)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
