use tracing::{error, info};

use widesky::config::Config;
use widesky::directory::DirectoryClient;
use widesky::errors::StartupError;
use widesky::{db, lifecycle, logging, persistence, processing, supervisor};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let _logging_guard = match logging::init(&config.log_dir, &config.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        error!(error = %err, "fatal startup error");
        std::process::exit(1);
    }
    info!("shut down gracefully");
}

async fn run(config: Config) -> Result<(), StartupError> {
    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url(), config.persistence_workers as u32).await?;
    db::ensure_schema(&pool, config.reset_database).await?;
    info!("schema ready");

    let directory = DirectoryClient::new();

    let (raw_tx, raw_rx) = tokio::sync::mpsc::channel(config.queue_capacity);
    let (persist_tx, persist_rx) = tokio::sync::mpsc::channel(config.queue_capacity);
    let (shutdown_tx, shutdown_rx) = lifecycle::shutdown_channel();

    let processing_handles = processing::spawn(config.processing_workers, raw_rx, persist_tx.clone());
    let persistence_handles = persistence::spawn(
        config.persistence_workers,
        persist_rx,
        pool.clone(),
        directory,
        config.batch_size,
        config.batch_timeout,
    );

    let supervisor_handle = tokio::spawn(supervisor::run(config.firehose_url.clone(), raw_tx, shutdown_rx));

    lifecycle::wait_for_shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    let _ = supervisor_handle.await;

    for handle in processing_handles {
        let _ = handle.await;
    }

    lifecycle::drain_persistence(&persist_tx, config.persistence_workers).await;
    for handle in persistence_handles {
        let _ = handle.await;
    }

    pool.close().await;
    info!("postgres pool closed");

    Ok(())
}
