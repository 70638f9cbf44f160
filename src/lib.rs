//! Streaming ingest pipeline for the Bluesky firehose: a supervisor receives
//! commit frames over a WebSocket, a processing pool decodes and classifies
//! them, and a persistence pool batches the resulting rows into Postgres,
//! enriching authors from the `plc.directory` handle directory along the way.

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod persistence;
pub mod processing;
pub mod repo;
pub mod supervisor;
