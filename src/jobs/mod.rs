use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
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

        tokio::spawn(Self::expired_code_purge_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Purge expired, unconsumed binding codes (runs every hour)
    async fn expired_code_purge_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match tasks::purge_expired_codes(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired binding codes", count);
                    }
                }
                Err(e) => error!("Failed to purge expired binding codes: {}", e),
            }
        }
    }
}
