//! Author-directory enrichment client: resolves an author identifier to its
//! primary handle and full handle list via `https://plc.directory/{id}`,
//! with an in-process TTL cache and retrying transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::DirectoryError;

const CACHE_TTL: Duration = Duration::from_secs(3600);
const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSet {
    pub primary: String,
    pub all: Vec<String>,
}

#[derive(Deserialize)]
struct PlcDirectoryDoc {
    #[serde(default, rename = "alsoKnownAs")]
    also_known_as: Vec<String>,
}

#[derive(Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    cache: Arc<Mutex<HashMap<String, (HandleSet, Instant)>>>,
}

impl DirectoryClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client config is valid");
        Self {
            http,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve `did`'s handle set, consulting the cache first. An expired
    /// entry is treated as a miss. Retries every failure — transport errors
    /// and a malformed 200 body alike — with exponential backoff (base
    /// 100ms, cap 10s) indefinitely; the caller is expected to bound overall
    /// attempts by giving up on the owning request, not this method.
    pub async fn lookup(&self, did: &str) -> Result<HandleSet, DirectoryError> {
        if let Some(cached) = self.cached(did).await {
            return Ok(cached);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.fetch(did).await {
                Ok(handles) => {
                    self.cache
                        .lock()
                        .await
                        .insert(did.to_owned(), (handles.clone(), Instant::now()));
                    return Ok(handles);
                }
                Err(err) => {
                    let delay = std::cmp::min(BACKOFF_BASE * 2u32.saturating_pow(attempt), BACKOFF_CAP);
                    warn!(did, attempt, error = %err, delay_ms = delay.as_millis(), "directory lookup failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn cached(&self, did: &str) -> Option<HandleSet> {
        let cache = self.cache.lock().await;
        match cache.get(did) {
            Some((handles, fetched_at)) if fetched_at.elapsed() < CACHE_TTL => {
                debug!(did, "directory cache hit");
                Some(handles.clone())
            }
            _ => None,
        }
    }

    async fn fetch(&self, did: &str) -> Result<HandleSet, DirectoryError> {
        let url = format!("https://plc.directory/{did}");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DirectoryError::NonSuccess {
                did: did.to_owned(),
                status: response.status(),
            });
        }
        let doc: PlcDirectoryDoc = response.json().await?;
        let primary = doc
            .also_known_as
            .first()
            .cloned()
            .ok_or_else(|| DirectoryError::EmptyHandleList(did.to_owned()))?;
        Ok(HandleSet {
            primary,
            all: doc.also_known_as,
        })
    }
}

impl Default for DirectoryClient {
    fn default() -> Self {
        Self::new()
    }
}
