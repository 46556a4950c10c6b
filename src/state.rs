use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::db::RepositoryTrait;
use crate::error::{DashboardError, Result};
use crate::lapi::LapiApi;
use crate::sync::SyncEngine;
use crate::ws::Broadcaster;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub repo: Arc<dyn RepositoryTrait>,
    /// `None` when LAPI is not configured; polling is then disabled
    pub lapi: Option<Arc<dyn LapiApi>>,
    pub engine: Option<Arc<SyncEngine>>,
    pub broadcaster: Arc<Broadcaster>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub bearer_token: Option<String>,
    pub start_time: Instant,
    pub db_pool: Option<sqlx::PgPool>,
    shutting_down: AtomicBool,
}

impl AppState {
    pub fn new(
        settings: Settings,
        repo: Arc<dyn RepositoryTrait>,
        lapi: Option<Arc<dyn LapiApi>>,
        engine: Option<Arc<SyncEngine>>,
        broadcaster: Arc<Broadcaster>,
        db_pool: Option<sqlx::PgPool>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let bearer_token = settings.http.auth.token.clone();

        Arc::new(Self {
            settings,
            repo,
            lapi,
            engine,
            broadcaster,
            shutdown_tx,
            bearer_token,
            start_time: Instant::now(),
            db_pool,
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn lapi(&self) -> Result<&Arc<dyn LapiApi>> {
        self.lapi.as_ref().ok_or(DashboardError::NotConfigured("LAPI"))
    }

    pub fn engine(&self) -> Result<&Arc<SyncEngine>> {
        self.engine
            .as_ref()
            .ok_or(DashboardError::NotConfigured("LAPI"))
    }

    /// Start a sync on the runtime without waiting for it. It shares the
    /// engine's exclusion with the scheduled loop.
    pub fn spawn_sync(&self, force_full_sync: bool) -> Result<()> {
        let engine = Arc::clone(self.engine()?);
        tokio::spawn(async move {
            if let Err(e) = engine.run(force_full_sync).await {
                tracing::error!(error = %e, force_full_sync, "background sync failed");
            }
        });
        Ok(())
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
