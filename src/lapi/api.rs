use async_trait::async_trait;

use super::{
    AlertFilters, ConnectionHealth, DecisionFilters, DecisionStream, DeleteDecisionResponse,
    LapiAlert, LapiDecision, StreamOptions,
};
use crate::error::Result;

/// Operations the dashboard needs from the CrowdSec Local API
#[async_trait]
pub trait LapiApi: Send + Sync {
    /// Probe connectivity and bouncer key validity. Never fails.
    async fn check_connection_health(&self) -> ConnectionHealth;

    /// Current active decisions, optionally filtered (bouncer key)
    async fn get_decisions(&self, filters: &DecisionFilters) -> Result<Vec<LapiDecision>>;

    /// New and deleted decisions since the last poll, or the full state
    /// when `startup` is set (bouncer key)
    async fn get_decision_stream(&self, options: &StreamOptions) -> Result<DecisionStream>;

    /// Alerts with their events and decision references (watcher token)
    async fn get_alerts(&self, filters: &AlertFilters) -> Result<Vec<LapiAlert>>;

    /// Delete one decision (watcher token). A zero deleted count is an error.
    async fn delete_decision_by_id(&self, id: i64) -> Result<DeleteDecisionResponse>;
}
