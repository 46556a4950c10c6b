use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{CountryLookup, DecisionAlertMap};
use crate::alert_types::extract_alert_data;
use crate::db::RepositoryTrait;
use crate::domain::{DecisionUpsert, HostUpsert, StoredAlert, compute_expires_at};
use crate::error::Result;
use crate::lapi::{LapiAlert, LapiDecision};
use crate::observability::{DECISIONS_PRUNED, ORPHAN_ALERTS_PRUNED};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Writes polled LAPI state into the repository in bounded batches.
pub struct Reconciler {
    repo: Arc<dyn RepositoryTrait>,
    geo: Arc<dyn CountryLookup>,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn RepositoryTrait>,
        geo: Arc<dyn CountryLookup>,
        batch_size: usize,
    ) -> Self {
        Self {
            repo,
            geo,
            batch_size: batch_size.max(1),
        }
    }

    /// Create or refresh the hosts targeted by `decisions`.
    ///
    /// Enrichment comes from the source record of the first linked alert;
    /// the country falls back to the configured lookup. Missing values never
    /// clear what is already stored.
    pub async fn upsert_hosts(
        &self,
        decisions: &[LapiDecision],
        alert_map: &DecisionAlertMap,
    ) -> Result<()> {
        for batch in decisions.chunks(self.batch_size) {
            let hosts: Vec<HostUpsert> = batch
                .iter()
                .map(|d| {
                    let source = alert_map
                        .get(&d.id)
                        .and_then(|alerts| alerts.first())
                        .map(|a| &a.source);
                    HostUpsert {
                        ip: d.value.clone(),
                        scope: d.scope.clone(),
                        country: source
                            .and_then(|s| s.cn.clone())
                            .or_else(|| self.geo.country(&d.value)),
                        as_number: source.and_then(|s| s.as_number.clone()),
                        as_name: source.and_then(|s| s.as_name.clone()),
                        latitude: source.and_then(|s| s.latitude),
                        longitude: source.and_then(|s| s.longitude),
                    }
                })
                .collect();
            self.repo.upsert_hosts(&hosts).await?;
        }
        Ok(())
    }

    /// Host stubs for decisions that are leaving. Existing hosts are not touched.
    pub async fn ensure_hosts_exist(&self, decisions: &[LapiDecision]) -> Result<()> {
        for batch in decisions.chunks(self.batch_size) {
            let hosts: Vec<HostUpsert> = batch
                .iter()
                .map(|d| HostUpsert {
                    ip: d.value.clone(),
                    scope: d.scope.clone(),
                    country: self.geo.country(&d.value),
                    ..Default::default()
                })
                .collect();
            self.repo.insert_missing_hosts(&hosts).await?;
        }
        Ok(())
    }

    /// Store the alerts linked to one batch of decisions. Alerts already
    /// stored are left as they are.
    pub async fn upsert_alerts(
        &self,
        batch: &[LapiDecision],
        alert_map: &DecisionAlertMap,
    ) -> Result<()> {
        let mut unique: HashMap<i64, &LapiAlert> = HashMap::new();
        for d in batch {
            for alert in alert_map.get(&d.id).into_iter().flatten() {
                unique.insert(alert.id, alert);
            }
        }
        if unique.is_empty() {
            return Ok(());
        }

        let alerts = unique
            .into_values()
            .map(to_stored_alert)
            .collect::<Result<Vec<_>>>()?;
        self.repo.insert_alerts(&alerts).await
    }

    /// Mark `decisions` active and link them to their alerts.
    ///
    /// Writes happen in two phases per batch:
    /// 1. the batch's linked alerts are stored ([`Self::upsert_alerts`]);
    /// 2. the decisions are upserted and linked to those alerts.
    ///
    /// Phase 2 references rows created by phase 1, so the order is part of
    /// the contract. Existing decisions get every newly resolved link, which
    /// fills in links a previous partial sync missed. Hosts must exist,
    /// see [`Self::upsert_hosts`].
    pub async fn upsert_active_decisions(
        &self,
        decisions: &[LapiDecision],
        alert_map: &DecisionAlertMap,
    ) -> Result<()> {
        let now = Utc::now();
        for batch in decisions.chunks(self.batch_size) {
            self.upsert_alerts(batch, alert_map).await?;

            let upserts: Vec<DecisionUpsert> = batch
                .iter()
                .map(|d| {
                    let alert_ids = alert_map
                        .get(&d.id)
                        .map(|alerts| alerts.iter().map(|a| a.id).collect())
                        .unwrap_or_default();
                    to_upsert(d, alert_ids, now)
                })
                .collect();
            self.repo.upsert_active_decisions(&upserts).await?;
        }
        Ok(())
    }

    /// Mark `decisions` inactive, recomputing their expiry from the reported
    /// (possibly negative) remaining duration.
    pub async fn upsert_inactive_decisions(&self, decisions: &[LapiDecision]) -> Result<()> {
        let now = Utc::now();
        for batch in decisions.chunks(self.batch_size) {
            let upserts: Vec<DecisionUpsert> =
                batch.iter().map(|d| to_upsert(d, Vec::new(), now)).collect();
            self.repo.upsert_inactive_decisions(&upserts).await?;
        }
        Ok(())
    }

    /// After a full fetch: deactivate stored decisions LAPI no longer reports
    pub async fn deactivate_stale_decisions(&self, active_ids: &[i64]) -> Result<u64> {
        let count = self.repo.deactivate_decisions_except(active_ids).await?;
        if count > 0 {
            tracing::info!(count, "marked stale decisions inactive");
        }
        Ok(count)
    }

    /// Delete the oldest inactive decisions until at most `limit` remain,
    /// then the alerts left without a decision. Active decisions are never
    /// removed. Returns the distinct host addresses that lost decisions.
    pub async fn prune_old_decisions(&self, limit: u64) -> Result<Vec<String>> {
        let total = self.repo.count_decisions().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        if total <= limit {
            return Ok(Vec::new());
        }

        let candidates = self.repo.oldest_inactive_decisions(total - limit).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();
        let deleted = self.repo.delete_decisions(&ids).await?;
        let orphans = self.repo.delete_orphan_alerts().await?;
        DECISIONS_PRUNED.inc_by(deleted);
        ORPHAN_ALERTS_PRUNED.inc_by(orphans);
        tracing::info!(
            decisions = deleted,
            orphan_alerts = orphans,
            retention_limit = limit,
            "pruned inactive decisions"
        );

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter_map(|(_, ip)| seen.insert(ip.clone()).then_some(ip))
            .collect())
    }

    pub async fn update_host_ban_counts(&self, ips: &[String]) -> Result<()> {
        for ip in ips {
            self.repo.refresh_host_total_bans(ip).await?;
        }
        Ok(())
    }
}

fn to_upsert(d: &LapiDecision, alert_ids: Vec<i64>, now: chrono::DateTime<Utc>) -> DecisionUpsert {
    DecisionUpsert {
        id: d.id,
        host_ip: d.value.clone(),
        decision_type: d.decision_type.clone(),
        origin: d.origin.clone(),
        scenario: d.scenario.clone(),
        duration: d.duration.clone(),
        expires_at: compute_expires_at(d.until, &d.duration, now),
        alert_ids,
    }
}

fn to_stored_alert(alert: &LapiAlert) -> Result<StoredAlert> {
    let extract = extract_alert_data(alert);
    Ok(StoredAlert {
        id: alert.id,
        scenario: alert.scenario.clone(),
        message: alert.message.clone(),
        created_at: alert.created_at,
        host_ip: alert.source.value.clone(),
        entries: extract.entries,
        entry_type: extract.entry_type,
        events_json: serde_json::to_string(&alert.events)?,
    })
}
