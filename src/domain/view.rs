use serde::Serialize;
use utoipa::ToSchema;

use super::{AlertSummary, Decision, Host};

/// A decision with its host and linked alert summaries, as the dashboard lists it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecisionView {
    #[serde(flatten)]
    pub decision: Decision,
    pub host: Option<Host>,
    pub alerts: Vec<AlertSummary>,
}

/// A host with the number of its currently active decisions
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostView {
    #[serde(flatten)]
    pub host: Host,
    pub active_decisions: i64,
}
