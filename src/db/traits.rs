use async_trait::async_trait;

use crate::domain::{
    Decision, DecisionQuery, DecisionUpsert, DecisionView, Host, HostUpsert, HostView,
    StoredAlert,
};
use crate::error::Result;

/// Storage seam for the sync engine and the API.
///
/// Every slice-taking write runs in a single transaction: either the whole
/// batch lands or none of it does.
#[async_trait]
pub trait RepositoryTrait: Send + Sync {
    // Hosts
    /// Create hosts or refresh them. `None` enrichment never overwrites.
    async fn upsert_hosts(&self, hosts: &[HostUpsert]) -> Result<()>;
    /// Create hosts that do not exist yet; existing rows are left untouched
    async fn insert_missing_hosts(&self, hosts: &[HostUpsert]) -> Result<()>;
    /// Recount the active decisions for `ip` into `total_bans`
    async fn refresh_host_total_bans(&self, ip: &str) -> Result<()>;
    async fn get_host(&self, ip: &str) -> Result<Option<Host>>;
    /// Hosts with their active decision count, most recently seen first
    async fn list_hosts(&self) -> Result<Vec<HostView>>;

    // Alerts
    /// Store alerts that are not stored yet. Existing ids are skipped.
    async fn insert_alerts(&self, alerts: &[StoredAlert]) -> Result<()>;
    async fn get_decision_alerts(&self, decision_id: i64) -> Result<Vec<StoredAlert>>;
    /// Delete alerts no decision references. Returns the number removed.
    async fn delete_orphan_alerts(&self) -> Result<u64>;

    // Decisions
    /// Insert as active, or re-activate and refresh type, origin and scenario.
    /// Linked alert ids must already be stored.
    async fn upsert_active_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()>;
    /// Insert as inactive, or deactivate and recompute `expires_at`
    async fn upsert_inactive_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()>;
    /// Deactivate every active decision whose id is not listed
    async fn deactivate_decisions_except(&self, active_ids: &[i64]) -> Result<u64>;
    async fn count_decisions(&self) -> Result<i64>;
    async fn count_active_decisions(&self) -> Result<i64>;
    /// Oldest inactive decisions as `(id, host_ip)`, by creation time then id
    async fn oldest_inactive_decisions(&self, limit: i64) -> Result<Vec<(i64, String)>>;
    /// Delete decisions and their alert links
    async fn delete_decisions(&self, ids: &[i64]) -> Result<u64>;
    async fn get_decision(&self, id: i64) -> Result<Option<Decision>>;
    /// Decisions with host and alert summaries, newest first
    async fn list_decisions(&self, query: &DecisionQuery) -> Result<Vec<DecisionView>>;
    /// Returns false if the decision is not stored
    async fn set_decision_inactive(&self, id: i64) -> Result<bool>;
}
