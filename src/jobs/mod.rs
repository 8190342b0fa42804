//! Scheduled Jobs
//!
//! Periodic maintenance: purging expired idempotency records and logging
//! ledger statistics.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::store::{LedgerStats, LedgerStore, StoreError};

// =========================================================================
// Jobs
// =========================================================================

/// Delete idempotency records older than `retention`
pub async fn purge_expired_idempotency_keys(
    store: &dyn LedgerStore,
    retention: chrono::Duration,
) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - retention;
    let rows_deleted = store.purge_idempotency_before(cutoff).await?;

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            cutoff = %cutoff,
            "Deleted expired idempotency keys"
        );
    }

    Ok(rows_deleted)
}

/// Fetch and log ledger-wide statistics
pub async fn log_ledger_stats(store: &dyn LedgerStore) -> Result<LedgerStats, StoreError> {
    let stats = store.stats().await?;

    tracing::info!(
        users = stats.users,
        active_accounts = stats.active_accounts,
        transactions = stats.transactions,
        total_active_balance = %stats.total_active_balance,
        "Ledger statistics"
    );

    Ok(stats)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for idempotency key purge (default: 10 minutes)
    pub idempotency_purge_interval: Duration,
    /// Age after which idempotency keys are purged (default: 24 hours)
    pub idempotency_retention: chrono::Duration,
    /// Interval for statistics logging (default: 1 hour)
    pub stats_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            idempotency_purge_interval: Duration::from_secs(600),
            idempotency_retention: chrono::Duration::hours(24),
            stats_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    store: Arc<dyn LedgerStore>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: JobSchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut purge_interval = interval(self.config.idempotency_purge_interval);
        let mut stats_interval = interval(self.config.stats_interval);

        loop {
            tokio::select! {
                _ = purge_interval.tick() => {
                    if let Err(e) = purge_expired_idempotency_keys(
                        self.store.as_ref(),
                        self.config.idempotency_retention,
                    ).await {
                        tracing::error!(error = %e, "Idempotency key purge failed");
                    }
                }
                _ = stats_interval.tick() => {
                    if let Err(e) = log_ledger_stats(self.store.as_ref()).await {
                        tracing::error!(error = %e, "Statistics collection failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_idempotency_keys(self.store.as_ref(), self.config.idempotency_retention)
            .await
        {
            Ok(count) => report.idempotency_keys_deleted = count,
            Err(e) => report.errors.push(format!("Idempotency purge: {}", e)),
        }

        match log_ledger_stats(self.store.as_ref()).await {
            Ok(stats) => report.stats = Some(stats),
            Err(e) => report.errors.push(format!("Statistics: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub idempotency_keys_deleted: u64,
    pub stats: Option<LedgerStats>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

// =========================================================================
// Tests
// =========================================================================
