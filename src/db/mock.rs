use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::RepositoryTrait;
use crate::domain::{
    Decision, DecisionQuery, DecisionUpsert, DecisionView, Host, HostUpsert, HostView,
    StoredAlert,
};
use crate::error::{DashboardError, Result};

/// In-memory repository for tests. Mirrors the PostgreSQL semantics,
/// including the host foreign key on decisions.
pub struct MockRepository {
    hosts: Mutex<HashMap<String, Host>>,
    alerts: Mutex<HashMap<i64, StoredAlert>>,
    decisions: Mutex<HashMap<i64, Decision>>,
    links: Mutex<BTreeSet<(i64, i64)>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            alerts: Mutex::new(HashMap::new()),
            decisions: Mutex::new(HashMap::new()),
            links: Mutex::new(BTreeSet::new()),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of write calls made so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail, as a lost database connection would
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn wrote(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DashboardError::Internal("database unavailable".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn alert_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.alerts.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn linked_alert_ids(&self, decision_id: i64) -> Vec<i64> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == decision_id)
            .map(|(_, a)| *a)
            .collect()
    }

    /// Backdate a decision so pruning order can be controlled
    pub fn set_created_at(&self, id: i64, created_at: chrono::DateTime<Utc>) {
        if let Some(d) = self.decisions.lock().unwrap().get_mut(&id) {
            d.created_at = created_at;
        }
    }

    fn check_hosts_exist(&self, decisions: &[DecisionUpsert]) -> Result<()> {
        let hosts = self.hosts.lock().unwrap();
        match decisions.iter().find(|d| !hosts.contains_key(&d.host_ip)) {
            Some(d) => Err(DashboardError::Internal(format!(
                "decision {} references unknown host {}",
                d.id, d.host_ip
            ))),
            None => Ok(()),
        }
    }

    fn new_decision(d: &DecisionUpsert, active: bool) -> Decision {
        Decision {
            id: d.id,
            host_ip: d.host_ip.clone(),
            decision_type: d.decision_type.clone(),
            origin: d.origin.clone(),
            scenario: d.scenario.clone(),
            duration: d.duration.clone(),
            created_at: Utc::now(),
            expires_at: Some(d.expires_at),
            active,
        }
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryTrait for MockRepository {
    async fn upsert_hosts(&self, hosts: &[HostUpsert]) -> Result<()> {
        self.wrote()?;
        let now = Utc::now();
        let mut stored = self.hosts.lock().unwrap();
        for h in hosts {
            match stored.get_mut(&h.ip) {
                Some(existing) => existing.merge(h, now),
                None => {
                    stored.insert(h.ip.clone(), Host::from_upsert(h, now));
                }
            }
        }
        Ok(())
    }

    async fn insert_missing_hosts(&self, hosts: &[HostUpsert]) -> Result<()> {
        self.wrote()?;
        let now = Utc::now();
        let mut stored = self.hosts.lock().unwrap();
        for h in hosts {
            stored
                .entry(h.ip.clone())
                .or_insert_with(|| Host::from_upsert(h, now));
        }
        Ok(())
    }

    async fn refresh_host_total_bans(&self, ip: &str) -> Result<()> {
        self.wrote()?;
        let count = self
            .decisions
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.host_ip == ip && d.active)
            .count() as i64;
        if let Some(h) = self.hosts.lock().unwrap().get_mut(ip) {
            h.total_bans = count;
        }
        Ok(())
    }

    async fn get_host(&self, ip: &str) -> Result<Option<Host>> {
        Ok(self.hosts.lock().unwrap().get(ip).cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<HostView>> {
        let decisions = self.decisions.lock().unwrap();
        let mut views: Vec<HostView> = self
            .hosts
            .lock()
            .unwrap()
            .values()
            .map(|h| HostView {
                host: h.clone(),
                active_decisions: decisions
                    .values()
                    .filter(|d| d.active && d.host_ip == h.ip)
                    .count() as i64,
            })
            .collect();
        views.sort_by(|a, b| b.host.last_seen.cmp(&a.host.last_seen));
        Ok(views)
    }

    async fn insert_alerts(&self, alerts: &[StoredAlert]) -> Result<()> {
        self.wrote()?;
        let mut stored = self.alerts.lock().unwrap();
        for a in alerts {
            stored.entry(a.id).or_insert_with(|| a.clone());
        }
        Ok(())
    }

    async fn get_decision_alerts(&self, decision_id: i64) -> Result<Vec<StoredAlert>> {
        let alerts = self.alerts.lock().unwrap();
        let mut found: Vec<StoredAlert> = self
            .linked_alert_ids(decision_id)
            .into_iter()
            .filter_map(|id| alerts.get(&id).cloned())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete_orphan_alerts(&self) -> Result<u64> {
        self.wrote()?;
        let mut alerts = self.alerts.lock().unwrap();
        let links = self.links.lock().unwrap();
        let before = alerts.len();
        alerts.retain(|id, _| links.iter().any(|(_, a)| a == id));
        Ok((before - alerts.len()) as u64)
    }

    async fn upsert_active_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()> {
        self.wrote()?;
        self.check_hosts_exist(decisions)?;
        {
            let alerts = self.alerts.lock().unwrap();
            for d in decisions {
                if let Some(missing) = d.alert_ids.iter().find(|id| !alerts.contains_key(id)) {
                    return Err(DashboardError::Internal(format!(
                        "decision {} links unknown alert {}",
                        d.id, missing
                    )));
                }
            }
        }

        let mut stored = self.decisions.lock().unwrap();
        let mut links = self.links.lock().unwrap();
        for d in decisions {
            match stored.get_mut(&d.id) {
                Some(existing) => {
                    existing.decision_type = d.decision_type.clone();
                    existing.origin = d.origin.clone();
                    existing.scenario = d.scenario.clone();
                    existing.active = true;
                }
                None => {
                    stored.insert(d.id, Self::new_decision(d, true));
                }
            }
            for alert_id in &d.alert_ids {
                links.insert((d.id, *alert_id));
            }
        }
        Ok(())
    }

    async fn upsert_inactive_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()> {
        self.wrote()?;
        self.check_hosts_exist(decisions)?;
        let mut stored = self.decisions.lock().unwrap();
        for d in decisions {
            match stored.get_mut(&d.id) {
                Some(existing) => {
                    existing.active = false;
                    existing.expires_at = Some(d.expires_at);
                }
                None => {
                    stored.insert(d.id, Self::new_decision(d, false));
                }
            }
        }
        Ok(())
    }

    async fn deactivate_decisions_except(&self, active_ids: &[i64]) -> Result<u64> {
        self.wrote()?;
        let mut count = 0;
        for d in self.decisions.lock().unwrap().values_mut() {
            if d.active && !active_ids.contains(&d.id) {
                d.active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_decisions(&self) -> Result<i64> {
        Ok(self.decisions.lock().unwrap().len() as i64)
    }

    async fn count_active_decisions(&self) -> Result<i64> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.active)
            .count() as i64)
    }

    async fn oldest_inactive_decisions(&self, limit: i64) -> Result<Vec<(i64, String)>> {
        let decisions = self.decisions.lock().unwrap();
        let mut inactive: Vec<&Decision> = decisions.values().filter(|d| !d.active).collect();
        inactive.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(inactive
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|d| (d.id, d.host_ip.clone()))
            .collect())
    }

    async fn delete_decisions(&self, ids: &[i64]) -> Result<u64> {
        self.wrote()?;
        let mut decisions = self.decisions.lock().unwrap();
        let before = decisions.len();
        decisions.retain(|id, _| !ids.contains(id));
        self.links
            .lock()
            .unwrap()
            .retain(|(d, _)| !ids.contains(d));
        Ok((before - decisions.len()) as u64)
    }

    async fn get_decision(&self, id: i64) -> Result<Option<Decision>> {
        Ok(self.decisions.lock().unwrap().get(&id).cloned())
    }

    async fn list_decisions(&self, query: &DecisionQuery) -> Result<Vec<DecisionView>> {
        let mut decisions: Vec<Decision> = self
            .decisions
            .lock()
            .unwrap()
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut views = Vec::with_capacity(decisions.len());
        for d in decisions {
            let alerts = self
                .get_decision_alerts(d.id)
                .await?
                .iter()
                .map(StoredAlert::summary)
                .collect();
            views.push(DecisionView {
                host: self.hosts.lock().unwrap().get(&d.host_ip).cloned(),
                alerts,
                decision: d,
            });
        }
        Ok(views)
    }

    async fn set_decision_inactive(&self, id: i64) -> Result<bool> {
        self.wrote()?;
        match self.decisions.lock().unwrap().get_mut(&id) {
            Some(d) => {
                d.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
