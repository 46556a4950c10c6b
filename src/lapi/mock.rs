use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{
    AlertFilters, ConnectionHealth, DecisionFilters, DecisionStream, DeleteDecisionResponse,
    LapiAlert, LapiApi, LapiDecision, StreamOptions,
};
use crate::error::{DashboardError, Result};

/// Pauses a stream fetch until released, so tests can overlap sync runs
#[derive(Debug, Default)]
pub struct StreamGate {
    entered: Notify,
    release: Notify,
}

impl StreamGate {
    /// Resolves once a stream fetch is parked on the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Default)]
struct MockLapiState {
    streams: VecDeque<DecisionStream>,
    stream_calls: Vec<StreamOptions>,
    alerts_by_ip: HashMap<String, Vec<LapiAlert>>,
    failing_ips: HashSet<String>,
    alert_calls: Vec<AlertFilters>,
    decisions: Vec<LapiDecision>,
    deletable: HashSet<i64>,
    deleted: Vec<i64>,
}

/// In-memory LAPI for tests
#[derive(Debug)]
pub struct MockLapi {
    state: Mutex<MockLapiState>,
    health: Mutex<ConnectionHealth>,
    gate: Mutex<Option<Arc<StreamGate>>>,
}

impl Default for MockLapi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLapi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockLapiState::default()),
            health: Mutex::new(ConnectionHealth::ok()),
            gate: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockLapiState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a stream response. An empty queue yields an empty stream.
    pub fn push_stream(&self, new: Vec<LapiDecision>, deleted: Vec<LapiDecision>) {
        self.state().streams.push_back(DecisionStream { new, deleted });
    }

    pub fn set_alerts(&self, ip: &str, alerts: Vec<LapiAlert>) {
        self.state().alerts_by_ip.insert(ip.to_string(), alerts);
    }

    /// Make alert queries for this address fail
    pub fn fail_alerts_for(&self, ip: &str) {
        self.state().failing_ips.insert(ip.to_string());
    }

    pub fn set_decisions(&self, decisions: Vec<LapiDecision>) {
        self.state().decisions = decisions;
    }

    /// Ids that a delete call will report as removed
    pub fn allow_delete(&self, id: i64) {
        self.state().deletable.insert(id);
    }

    pub fn set_health(&self, health: ConnectionHealth) {
        *self.health.lock().unwrap_or_else(|e| e.into_inner()) = health;
    }

    /// Park the next stream fetch on the returned gate
    pub fn hold_stream(&self) -> Arc<StreamGate> {
        let gate = Arc::new(StreamGate::default());
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&gate));
        gate
    }

    pub fn stream_calls(&self) -> Vec<StreamOptions> {
        self.state().stream_calls.clone()
    }

    pub fn alert_calls(&self) -> Vec<AlertFilters> {
        self.state().alert_calls.clone()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.state().deleted.clone()
    }
}

#[async_trait]
impl LapiApi for MockLapi {
    async fn check_connection_health(&self) -> ConnectionHealth {
        *self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn get_decisions(&self, filters: &DecisionFilters) -> Result<Vec<LapiDecision>> {
        let state = self.state();
        Ok(state
            .decisions
            .iter()
            .filter(|d| filters.ip.as_ref().is_none_or(|ip| &d.value == ip))
            .filter(|d| filters.scope.as_ref().is_none_or(|s| d.scope.eq_ignore_ascii_case(s)))
            .filter(|d| {
                filters
                    .decision_type
                    .as_ref()
                    .is_none_or(|t| d.decision_type.as_str() == t)
            })
            .cloned()
            .collect())
    }

    async fn get_decision_stream(&self, options: &StreamOptions) -> Result<DecisionStream> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state();
        state.stream_calls.push(options.clone());
        Ok(state.streams.pop_front().unwrap_or_default())
    }

    async fn get_alerts(&self, filters: &AlertFilters) -> Result<Vec<LapiAlert>> {
        let mut state = self.state();
        state.alert_calls.push(filters.clone());

        let Some(ip) = filters.ip.as_deref() else {
            return Ok(state.alerts_by_ip.values().flatten().cloned().collect());
        };
        if state.failing_ips.contains(ip) {
            return Err(DashboardError::LapiStatus {
                context: "failed to fetch alerts".into(),
                status: 500,
                body: String::new(),
            });
        }
        Ok(state.alerts_by_ip.get(ip).cloned().unwrap_or_default())
    }

    async fn delete_decision_by_id(&self, id: i64) -> Result<DeleteDecisionResponse> {
        let mut state = self.state();
        if !state.deletable.remove(&id) {
            return Err(DashboardError::DecisionNotFound(id));
        }
        state.deleted.push(id);
        Ok(DeleteDecisionResponse {
            nb_deleted: "1".into(),
        })
    }
}
