use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq)]
pub struct LikeRow {
    pub cid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub did: String,
    pub commit: String,
    pub subject_cid: Option<String>,
    pub subject_uri: Option<String>,
}

/// One multi-row `UNNEST`-based statement per flush, per [`super::posts::insert_batch`].
pub async fn insert_batch(pool: &PgPool, rows: &[LikeRow]) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let cids: Vec<&str> = rows.iter().map(|r| r.cid.as_str()).collect();
    let created_ats: Vec<Option<DateTime<Utc>>> = rows.iter().map(|r| r.created_at).collect();
    let dids: Vec<&str> = rows.iter().map(|r| r.did.as_str()).collect();
    let commits: Vec<&str> = rows.iter().map(|r| r.commit.as_str()).collect();
    let subject_cids: Vec<Option<&str>> = rows.iter().map(|r| r.subject_cid.as_deref()).collect();
    let subject_uris: Vec<Option<&str>> = rows.iter().map(|r| r.subject_uri.as_deref()).collect();

    let result = sqlx::query(
        r#"INSERT INTO likes (cid, created_at, did, commit, subject_cid, subject_uri)
           SELECT * FROM UNNEST(
               $1::text[], $2::timestamptz[], $3::text[], $4::text[], $5::text[], $6::text[]
           )
           ON CONFLICT (cid) DO NOTHING"#,
    )
    .bind(&cids)
    .bind(&created_ats)
    .bind(&dids)
    .bind(&commits)
    .bind(&subject_cids)
    .bind(&subject_uris)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
