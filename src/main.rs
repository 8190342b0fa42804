//! bank_ledger - ledger maintenance daemon
//!
//! Connects to PostgreSQL, verifies the schema, reports ledger statistics and
//! keeps purging expired idempotency keys until shut down.

use std::sync::Arc;

use bank_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use bank_ledger::store::{LedgerStore, PgLedgerStore};
use bank_ledger::{db, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_json);

    tracing::info!(environment = %config.environment, "Starting bank_ledger");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Apply schema/ledger.sql.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let store: Arc<dyn LedgerStore> =
        Arc::new(PgLedgerStore::new(pool.clone()).with_lock_timeout(config.lock_timeout));

    let scheduler = JobScheduler::with_config(
        store,
        JobSchedulerConfig {
            idempotency_retention: chrono::Duration::hours(config.idempotency_retention_hours),
            ..JobSchedulerConfig::default()
        },
    );

    let report = scheduler.run_all_once().await;
    for error in &report.errors {
        tracing::warn!(error = %error, "Startup maintenance step failed");
    }

    let jobs = scheduler.start();
    shutdown_signal().await;
    jobs.abort();

    // Cleanup
    tracing::info!("Shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
