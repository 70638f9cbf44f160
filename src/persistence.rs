//! Persistence stage: M workers, each batching four kinds of inserts with a
//! dual size/latency trigger, flushing through the `repo` upsert functions.

use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::directory::DirectoryClient;
use crate::errors::PersistenceError;
use crate::messages::PersistRequest;
use crate::repo::{self, LikeRow, PostRow, RepostRow, UserRow};

const SAMPLE_SIZE: usize = 3;

pub fn spawn(
    workers: usize,
    rx: mpsc::Receiver<PersistRequest>,
    pool: PgPool,
    directory: DirectoryClient,
    batch_size: usize,
    batch_timeout: Duration,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));
    (0..workers)
        .map(|id| {
            let rx = rx.clone();
            let pool = pool.clone();
            let directory = directory.clone();
            tokio::spawn(async move {
                run_worker(id, rx, pool, directory, batch_size, batch_timeout).await
            })
        })
        .collect()
}

#[derive(Default)]
struct Batches {
    users: Vec<String>,
    posts: Vec<PostRow>,
    reposts: Vec<RepostRow>,
    likes: Vec<LikeRow>,
}

async fn run_worker(
    id: usize,
    rx: std::sync::Arc<tokio::sync::Mutex<mpsc::Receiver<PersistRequest>>>,
    pool: PgPool,
    directory: DirectoryClient,
    batch_size: usize,
    batch_timeout: Duration,
) {
    let mut batches = Batches::default();
    let mut last_flush = Instant::now();

    loop {
        let elapsed = last_flush.elapsed();
        let timeout = batch_timeout.saturating_sub(elapsed);

        let received = {
            let mut guard = rx.lock().await;
            tokio::time::timeout(timeout, guard.recv()).await
        };

        let mut timed_out = false;
        match received {
            Ok(Some(PersistRequest::Shutdown)) => {
                debug!(worker = id, "persistence worker received shutdown sentinel");
                break;
            }
            Ok(Some(PersistRequest::InsertUser(did))) => batches.users.push(did),
            Ok(Some(PersistRequest::InsertPost(row))) => batches.posts.push(*row),
            Ok(Some(PersistRequest::InsertRepost(row))) => batches.reposts.push(*row),
            Ok(Some(PersistRequest::InsertLike(row))) => batches.likes.push(*row),
            Ok(None) => {
                debug!(worker = id, "persistence queue closed");
                break;
            }
            Err(_elapsed) => timed_out = true,
        }

        if should_flush(batches.users.len(), batch_size, timed_out) {
            flush_users(id, &pool, &directory, std::mem::take(&mut batches.users)).await;
            last_flush = Instant::now();
        }
        if should_flush(batches.posts.len(), batch_size, timed_out) {
            flush_posts(id, &pool, std::mem::take(&mut batches.posts)).await;
            last_flush = Instant::now();
        }
        if should_flush(batches.reposts.len(), batch_size, timed_out) {
            flush_reposts(id, &pool, std::mem::take(&mut batches.reposts)).await;
            last_flush = Instant::now();
        }
        if should_flush(batches.likes.len(), batch_size, timed_out) {
            flush_likes(id, &pool, std::mem::take(&mut batches.likes)).await;
            last_flush = Instant::now();
        }
    }
}

/// The dual flush trigger: a batch flushes once it reaches `batch_size`
/// regardless of the tick kind, or, on a timeout tick, as soon as it holds
/// anything at all. Pulled out as a pure function so the size- and
/// latency-bound properties are each a plain unit test, no clock or queue
/// required.
fn should_flush(len: usize, batch_size: usize, timed_out: bool) -> bool {
    len >= batch_size || (timed_out && len > 0)
}

/// For each candidate DID, drop it if a row already exists (no directory
/// call, no write); otherwise resolve its handle set and carry it into the
/// flush. A directory failure for one DID drops only that DID.
async fn flush_users(worker: usize, pool: &PgPool, directory: &DirectoryClient, dids: Vec<String>) {
    if dids.is_empty() {
        return;
    }
    let mut rows = Vec::with_capacity(dids.len());
    for did in dids {
        match repo::users::exists(pool, &did).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                let err = PersistenceError::from(err);
                error!(worker, did, error = %err, "user existence check failed, dropping");
                continue;
            }
        }
        match directory.lookup(&did).await {
            Ok(handles) => rows.push(UserRow {
                did,
                first_known_as: handles.primary,
                also_known_as_full: handles.all,
            }),
            Err(err) => {
                let err = PersistenceError::from(err);
                error!(worker, did, error = %err, "directory lookup failed, dropping user record");
            }
        }
    }
    if rows.is_empty() {
        return;
    }
    match repo::users::upsert_batch(pool, &rows).await {
        Ok(n) => info!(worker, count = n, "upserted users"),
        Err(err) => log_flush_failure(worker, "users", err, &rows),
    }
}

async fn flush_posts(worker: usize, pool: &PgPool, rows: Vec<PostRow>) {
    if rows.is_empty() {
        return;
    }
    match repo::posts::insert_batch(pool, &rows).await {
        Ok(n) => info!(worker, count = n, "inserted posts"),
        Err(err) => log_flush_failure(worker, "posts", err, &rows),
    }
}

async fn flush_reposts(worker: usize, pool: &PgPool, rows: Vec<RepostRow>) {
    if rows.is_empty() {
        return;
    }
    match repo::reposts::insert_batch(pool, &rows).await {
        Ok(n) => info!(worker, count = n, "inserted reposts"),
        Err(err) => log_flush_failure(worker, "reposts", err, &rows),
    }
}

async fn flush_likes(worker: usize, pool: &PgPool, rows: Vec<LikeRow>) {
    if rows.is_empty() {
        return;
    }
    match repo::likes::insert_batch(pool, &rows).await {
        Ok(n) => info!(worker, count = n, "inserted likes"),
        Err(err) => log_flush_failure(worker, "likes", err, &rows),
    }
}

/// A batch flush failure is an acceptable loss, not retried: by the time a
/// reconnect would let us retry, the firehose has moved on and would
/// redeliver fresher data anyway.
fn log_flush_failure<T: std::fmt::Debug>(worker: usize, kind: &str, err: sqlx::Error, batch: &[T]) {
    let err = PersistenceError::from(err);
    let sample: Vec<&T> = batch.iter().take(SAMPLE_SIZE).collect();
    error!(worker, kind, error = %err, sample = ?sample, "batch flush failed, discarding batch");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_at_batch_size_regardless_of_tick_kind() {
        assert!(should_flush(100, 100, false));
        assert!(should_flush(101, 100, false));
        assert!(!should_flush(99, 100, false));
    }

    #[test]
    fn timeout_tick_flushes_any_non_empty_batch() {
        assert!(should_flush(1, 100, true));
        assert!(!should_flush(0, 100, true));
    }
}
