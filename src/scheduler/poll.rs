use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::sync::{SyncEngine, SyncOutcome};

/// Drives [`SyncEngine`] on a fixed interval until shutdown.
pub struct SyncLoop {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl SyncLoop {
    pub fn new(engine: Arc<SyncEngine>, interval_seconds: u64) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "starting decision sync loop"
        );

        // first tick fires immediately
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.recv() => {
                    tracing::info!("decision sync loop shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.engine.run(false).await {
            Ok(SyncOutcome::Completed(report)) => {
                tracing::debug!(?report, "scheduled sync finished");
            }
            Ok(SyncOutcome::Skipped) => {}
            Err(e) => tracing::error!(error = %e, "scheduled sync failed"),
        }
    }
}
