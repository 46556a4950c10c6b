use serde::Serialize;
use utoipa::ToSchema;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{Reconciler, build_decision_alert_map, distinct_ips};
use crate::db::RepositoryTrait;
use crate::domain::DecisionQuery;
use crate::error::Result;
use crate::lapi::{LapiApi, StreamOptions};
use crate::observability::{ACTIVE_DECISIONS, DECISIONS_PROCESSED, SYNC_DURATION, SYNC_RUNS};
use crate::ws::{Broadcaster, WsMessage};

/// Knobs for a sync run, taken from configuration
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub origins: Option<String>,
    pub scopes: Option<String>,
    /// Upper bound on stored decisions; `None` keeps everything
    pub retention_count: Option<u64>,
    pub alert_chunk_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            origins: Some("crowdsec,cscli".to_string()),
            scopes: None,
            retention_count: None,
            alert_chunk_size: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Set until the first run completes; that run asks for the full state
    pub first_fetch: bool,
    /// A full sync was asked for while another run was in progress
    pub full_sync_requested: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            first_fetch: true,
            full_sync_requested: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    pub full_sync: bool,
    pub new_decisions: usize,
    pub deleted_decisions: usize,
    pub deactivated: u64,
    pub pruned_hosts: usize,
    pub active_decisions: usize,
    pub hosts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run was in progress; nothing was written
    Skipped,
}

/// Returns the phase to idle however the run ends
struct RunGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.phase = SyncPhase::Idle;
    }
}

/// Runs fetch → link → reconcile → broadcast, one run at a time.
pub struct SyncEngine {
    lapi: Arc<dyn LapiApi>,
    repo: Arc<dyn RepositoryTrait>,
    reconciler: Reconciler,
    broadcaster: Arc<Broadcaster>,
    options: SyncOptions,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(
        lapi: Arc<dyn LapiApi>,
        repo: Arc<dyn RepositoryTrait>,
        reconciler: Reconciler,
        broadcaster: Arc<Broadcaster>,
        options: SyncOptions,
    ) -> Self {
        Self {
            lapi,
            repo,
            reconciler,
            broadcaster,
            options,
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one sync. `force_full_sync` asks LAPI for the complete state
    /// instead of a delta.
    ///
    /// If a run is already in progress this returns `Skipped` without
    /// touching LAPI or storage; a full sync asked for that way is carried
    /// over to the next run.
    pub async fn run(&self, force_full_sync: bool) -> Result<SyncOutcome> {
        let startup = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.phase == SyncPhase::Running {
                if force_full_sync {
                    state.full_sync_requested = true;
                }
                tracing::info!(force_full_sync, "sync already in progress, skipping");
                SYNC_RUNS.with_label_values(&["skipped"]).inc();
                return Ok(SyncOutcome::Skipped);
            }
            state.phase = SyncPhase::Running;
            let startup = state.first_fetch || force_full_sync || state.full_sync_requested;
            state.full_sync_requested = false;
            startup
        };
        let _guard = RunGuard { state: &self.state };

        let started = Instant::now();
        match self.sync(startup).await {
            Ok(report) => {
                SYNC_RUNS.with_label_values(&["success"]).inc();
                SYNC_DURATION.observe(started.elapsed().as_secs_f64());
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                SYNC_RUNS.with_label_values(&["error"]).inc();
                if startup {
                    // the full fetch still has to happen
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.full_sync_requested = true;
                }
                Err(e)
            }
        }
    }

    async fn sync(&self, startup: bool) -> Result<SyncReport> {
        let first_fetch = self.state().first_fetch;
        tracing::info!(startup, first_fetch, "starting decision sync");

        let stream = self
            .lapi
            .get_decision_stream(&StreamOptions {
                startup,
                origins: self.options.origins.clone(),
                scopes: self.options.scopes.clone(),
            })
            .await?;
        tracing::info!(
            new = stream.new.len(),
            deleted = stream.deleted.len(),
            "fetched decision stream"
        );

        let mut report = SyncReport {
            full_sync: startup,
            new_decisions: stream.new.len(),
            deleted_decisions: stream.deleted.len(),
            ..Default::default()
        };

        if !stream.new.is_empty() {
            let alert_map = build_decision_alert_map(
                self.lapi.as_ref(),
                &stream.new,
                self.options.alert_chunk_size,
            )
            .await;
            self.reconciler.upsert_hosts(&stream.new, &alert_map).await?;
            self.reconciler
                .upsert_active_decisions(&stream.new, &alert_map)
                .await?;
            self.reconciler
                .update_host_ban_counts(&distinct_ips(&stream.new))
                .await?;
            DECISIONS_PROCESSED
                .with_label_values(&["new"])
                .inc_by(stream.new.len() as f64);
        }

        if !stream.deleted.is_empty() {
            self.reconciler.ensure_hosts_exist(&stream.deleted).await?;
            self.reconciler
                .upsert_inactive_decisions(&stream.deleted)
                .await?;
            self.reconciler
                .update_host_ban_counts(&distinct_ips(&stream.deleted))
                .await?;
            DECISIONS_PROCESSED
                .with_label_values(&["deleted"])
                .inc_by(stream.deleted.len() as f64);
        }

        if startup {
            let active_ids: Vec<i64> = stream.new.iter().map(|d| d.id).collect();
            report.deactivated = self
                .reconciler
                .deactivate_stale_decisions(&active_ids)
                .await?;
        }

        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .first_fetch = false;

        if let Some(limit) = self.options.retention_count {
            let pruned = self.reconciler.prune_old_decisions(limit).await?;
            if !pruned.is_empty() {
                self.reconciler.update_host_ban_counts(&pruned).await?;
            }
            report.pruned_hosts = pruned.len();
        }

        let (active, hosts) = self.broadcast_current_state().await?;
        report.active_decisions = active;
        report.hosts = hosts;

        tracing::info!(
            active_decisions = active,
            hosts,
            deactivated = report.deactivated,
            "sync complete"
        );
        Ok(report)
    }

    /// Push the active decisions and all hosts to live subscribers
    async fn broadcast_current_state(&self) -> Result<(usize, usize)> {
        let decisions = self
            .repo
            .list_decisions(&DecisionQuery {
                active: Some(true),
                ..Default::default()
            })
            .await?;
        let hosts = self.repo.list_hosts().await?;
        let counts = (decisions.len(), hosts.len());
        ACTIVE_DECISIONS.set(decisions.len() as i64);

        self.broadcaster.publish(&WsMessage::Decisions(decisions))?;
        self.broadcaster.publish(&WsMessage::Hosts(hosts))?;
        Ok(counts)
    }
}
