use utoipa::OpenApi;

use super::handlers::{
    AlertDetail, DecisionsListResponse, DeleteDecisionResponse, ErrorResponse,
    HostsListResponse, PublicHealthResponse, SyncRequest, SyncResponse,
};
use crate::domain::{AlertEntryType, AlertSummary, Decision, DecisionView, Host, HostView};
use crate::lapi::{ConnectionHealth, HealthError, HealthStatus};
use crate::sync::{SyncPhase, SyncReport, SyncState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "crowdsec-dashboard API",
        version = "1.0.0",
        description = "Local cache of CrowdSec decisions, hosts and alerts",
        license(name = "MIT")
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        super::handlers::health,
        super::handlers::lapi_health,
        super::handlers::list_decisions,
        super::handlers::get_decision_alerts,
        super::handlers::delete_decision,
        super::handlers::list_hosts,
        super::handlers::get_host,
        super::handlers::trigger_sync,
    ),
    components(
        schemas(
            PublicHealthResponse,
            ConnectionHealth,
            HealthStatus,
            HealthError,
            DecisionsListResponse,
            DecisionView,
            Decision,
            AlertSummary,
            AlertEntryType,
            AlertDetail,
            DeleteDecisionResponse,
            HostsListResponse,
            HostView,
            Host,
            SyncRequest,
            SyncResponse,
            SyncReport,
            SyncState,
            SyncPhase,
            ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health and LAPI connectivity"),
        (name = "decisions", description = "Stored decisions and their alerts"),
        (name = "hosts", description = "Hosts that received decisions"),
        (name = "sync", description = "Manual synchronization"),
    )
)]
pub struct ApiDoc;
