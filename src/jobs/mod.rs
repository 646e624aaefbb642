use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::metrics::record_background_job;

pub mod tasks;

/// Job scheduler for background tasks
///
/// Housekeeping only: every read already treats expired rows as absent, so
/// nothing here is needed for correctness.
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::housekeeping_job(Arc::clone(&self)));
        tokio::spawn(Self::audit_chain_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Purge expired sessions, stale attempts and dead credentials (runs every 15 minutes)
    async fn housekeeping_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match tasks::run_housekeeping(&scheduler.context).await {
                Ok(count) => {
                    record_background_job("housekeeping", true);
                    if count > 0 {
                        info!("Housekeeping removed {} expired rows", count);
                    }
                }
                Err(e) => {
                    record_background_job("housekeeping", false);
                    error!("Housekeeping failed: {}", e);
                }
            }
        }
    }

    /// Verify the audit hash chain (runs every 6 hours)
    async fn audit_chain_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(21600));

        loop {
            interval.tick().await;

            match tasks::verify_audit_chain(&scheduler.context).await {
                Ok(verification) if verification.chain_intact => {
                    record_background_job("audit_chain", true);
                    info!("Audit chain intact ({} entries)", verification.total_entries);
                }
                Ok(verification) => {
                    record_background_job("audit_chain", false);
                    warn!(
                        "Audit chain broken at entry {:?}",
                        verification.first_break_at
                    );
                }
                Err(e) => {
                    record_background_job("audit_chain", false);
                    error!("Audit chain verification failed: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                record_background_job("health_check", false);
                error!("Health check failed: {}", e);
            }
        }
    }
}
