//! Processing stage: N workers that decode raw frames, classify their ops,
//! assemble typed rows, and forward them to the persistence queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use widesky_protocol::records::{classify_ops, extract_embed, extract_reply, ActivityKind};
use widesky_protocol::{frame, Node};

use crate::messages::{PersistRequest, RawFrame};
use crate::repo::{LikeRow, PostRow, RepostRow};

/// Spawn `workers` processing tasks sharing `rx`. Each dequeues a frame,
/// decodes it, and enqueues zero or more [`PersistRequest`]s onto `tx`.
/// Decode/classification failures are logged and the offending frame is
/// dropped — the worker itself never exits on a bad frame.
pub fn spawn(
    workers: usize,
    rx: mpsc::Receiver<RawFrame>,
    tx: mpsc::Sender<PersistRequest>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers)
        .map(|id| {
            let rx = rx.clone();
            let tx = tx.clone();
            tokio::spawn(async move { run_worker(id, rx, tx).await })
        })
        .collect()
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<RawFrame>>>,
    tx: mpsc::Sender<PersistRequest>,
) {
    loop {
        let frame = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(bytes) = frame else {
            debug!(worker = id, "processing queue closed, exiting");
            break;
        };
        if let Err(err) = handle_frame(&bytes, &tx).await {
            warn!(worker = id, error = %err, "failed to process frame, dropping");
        }
    }
}

async fn handle_frame(
    bytes: &[u8],
    tx: &mpsc::Sender<PersistRequest>,
) -> Result<(), crate::errors::ProcessingError> {
    let Some(commit) = frame::decode_commit_frame(bytes).await? else {
        return Ok(());
    };

    if tx.send(PersistRequest::InsertUser(commit.repo.clone())).await.is_err() {
        warn!(did = commit.repo, "persistence queue closed, dropping user enqueue");
    }

    for classified in classify_ops(&commit) {
        let Some(block) = commit.find_block(&classified.cid) else {
            // Commit metadata present but payload block absent — common and
            // expected, per the processing-stage record-assembly contract.
            continue;
        };

        match classified.kind {
            ActivityKind::Post => {
                let row = assemble_post(&classified.cid, &commit.repo, &commit.commit, &block);
                let cid = row.cid.clone();
                if tx.send(PersistRequest::InsertPost(Box::new(row))).await.is_err() {
                    warn!(cid, "persistence queue closed, dropping post");
                }
            }
            ActivityKind::Repost => {
                if let Some(row) = assemble_activity_subject(&classified.cid, &commit.repo, &commit.commit, &block) {
                    let (cid, created_at, did, commit_id, subject_cid, subject_uri) = row;
                    let dropped_cid = cid.clone();
                    if tx
                        .send(PersistRequest::InsertRepost(Box::new(RepostRow {
                            cid,
                            created_at,
                            did,
                            commit: commit_id,
                            subject_cid,
                            subject_uri,
                        })))
                        .await
                        .is_err()
                    {
                        warn!(cid = dropped_cid, "persistence queue closed, dropping repost");
                    }
                }
            }
            ActivityKind::Like => {
                if let Some(row) = assemble_activity_subject(&classified.cid, &commit.repo, &commit.commit, &block) {
                    let (cid, created_at, did, commit_id, subject_cid, subject_uri) = row;
                    let dropped_cid = cid.clone();
                    if tx
                        .send(PersistRequest::InsertLike(Box::new(LikeRow {
                            cid,
                            created_at,
                            did,
                            commit: commit_id,
                            subject_cid,
                            subject_uri,
                        })))
                        .await
                        .is_err()
                    {
                        warn!(cid = dropped_cid, "persistence queue closed, dropping like");
                    }
                }
            }
        }
    }

    Ok(())
}

fn parse_created_at(node: &Node<'_>) -> Option<DateTime<Utc>> {
    node.get("createdAt")
        .and_then(|n| n.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn assemble_post(cid: &str, repo: &str, commit: &str, block: &Node<'_>) -> PostRow {
    let text = block.get("text").and_then(|n| n.as_str()).unwrap_or("").to_owned();
    let langs = block
        .get("langs")
        .and_then(|n| n.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_text()).map(str::to_owned).collect())
        .unwrap_or_default();
    let facets = block.get("facets").map(|n| n.to_json());

    let embed = extract_embed(block);
    let reply = extract_reply(block);

    PostRow {
        cid: cid.to_owned(),
        created_at: parse_created_at(block),
        did: repo.to_owned(),
        commit: commit.to_owned(),
        text,
        langs,
        facets,
        has_embed: embed.has_embed,
        embed_type: embed.embed_type,
        embed_refs: embed.embed_refs,
        external_uri: embed.external_uri,
        has_record: embed.has_record,
        record_cid: embed.record_cid,
        record_uri: embed.record_uri,
        is_reply: reply.is_reply,
        reply_root_cid: reply.root_cid,
        reply_root_uri: reply.root_uri,
        reply_parent_cid: reply.parent_cid,
        reply_parent_uri: reply.parent_uri,
    }
}

type ActivitySubjectRow = (String, Option<DateTime<Utc>>, String, String, Option<String>, Option<String>);

fn assemble_activity_subject(cid: &str, repo: &str, commit: &str, block: &Node<'_>) -> Option<ActivitySubjectRow> {
    let subject = block.get("subject")?;
    let subject_cid = subject.get("cid").and_then(|n| n.as_str()).map(str::to_owned);
    let subject_uri = subject.get("uri").and_then(|n| n.as_str()).map(str::to_owned);
    Some((
        cid.to_owned(),
        parse_created_at(block),
        repo.to_owned(),
        commit.to_owned(),
        subject_cid,
        subject_uri,
    ))
}
