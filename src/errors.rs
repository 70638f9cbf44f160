//! Per-subsystem error types.
//!
//! Each stage of the pipeline gets its own error enum rather than one
//! catch-all — a decode failure in processing and a pool exhaustion in
//! persistence are different failure domains and are handled differently
//! (one logs and drops a record, the other logs and discards a batch).

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("missing or invalid configuration: {0}")]
    Config(String),
    #[error("failed to connect to Postgres: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed by peer")]
    ConnectionClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("frame decode failed: {0}")]
    Decode(#[from] widesky_protocol::DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("directory lookup failed: {0}")]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("plc.directory returned {status} for {did}")]
    NonSuccess {
        did: String,
        status: reqwest::StatusCode,
    },
    #[error("response from plc.directory had no alsoKnownAs entries for {0}")]
    EmptyHandleList(String),
}
