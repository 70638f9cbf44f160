//! Environment-sourced configuration. Every setting has a default matching
//! the reference deployment, so a bare `widesky` binary with just
//! `PG_PASS`/`PG_USER` set against a reachable `db` host will run.

use std::env;
use std::time::Duration;

use crate::errors::StartupError;

#[derive(Debug, Clone)]
pub struct Config {
    pub firehose_url: String,
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_db: String,
    pub pg_user: String,
    pub pg_pass: String,
    pub processing_workers: usize,
    pub persistence_workers: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub queue_capacity: usize,
    pub reset_database: bool,
    pub log_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        Ok(Self {
            firehose_url: env_or(
                "FIREHOSE_URL",
                "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos",
            ),
            pg_host: env_or("PG_HOST", "db"),
            pg_port: env_parse("PG_PORT", 5432)?,
            pg_db: env_or("PG_DB", "bluesky"),
            pg_user: env_or("PG_USER", "postgres"),
            pg_pass: env_or("PG_PASS", "postgres"),
            processing_workers: env_parse("PROCESSING_WORKERS", 5)?,
            persistence_workers: env_parse("PERSISTENCE_WORKERS", 5)?,
            batch_size: env_parse("BATCH_SIZE", 100)?,
            batch_timeout: Duration::from_secs(env_parse("BATCH_TIMEOUT_SECS", 3)?),
            queue_capacity: env_parse("QUEUE_CAPACITY", 4096)?,
            reset_database: env_parse("RESET_DATABASE", false)?,
            log_dir: env_or("LOG_DIR", "/app/logs"),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.pg_user, self.pg_pass, self.pg_host, self.pg_port, self.pg_db
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, StartupError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| StartupError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_assembles_postgres_dsn() {
        let cfg = Config {
            firehose_url: String::new(),
            pg_host: "db".to_owned(),
            pg_port: 5432,
            pg_db: "bluesky".to_owned(),
            pg_user: "postgres".to_owned(),
            pg_pass: "hunter2".to_owned(),
            processing_workers: 5,
            persistence_workers: 5,
            batch_size: 100,
            batch_timeout: Duration::from_secs(3),
            queue_capacity: 4096,
            reset_database: false,
            log_dir: "/app/logs".to_owned(),
            log_level: "info".to_owned(),
        };
        assert_eq!(cfg.database_url(), "postgres://postgres:hunter2@db:5432/bluesky");
    }
}
