use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;
use crate::alert_types::{ParsedEvent, parse_alert_event};
use crate::domain::{AlertEntryType, DecisionQuery, DecisionView, Host, HostView, StoredAlert};
use crate::error::DashboardError;
use crate::lapi::{AlertEvent, ConnectionHealth};
use crate::sync::{SyncOutcome, SyncReport, SyncState};

// Response types

#[derive(Serialize, ToSchema)]
pub struct PublicHealthResponse {
    /// Always "ok" when the process answers
    status: String,
    version: String,
    /// Authentication mode (none, bearer)
    auth_mode: String,
    uptime_seconds: u64,
    /// Whether LAPI polling is enabled
    lapi_configured: bool,
    /// Sync engine state, absent when polling is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    sync: Option<SyncState>,
}

#[derive(Serialize, ToSchema)]
pub struct DecisionsListResponse {
    decisions: Vec<DecisionView>,
    count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct HostsListResponse {
    hosts: Vec<HostView>,
    count: usize,
}

/// A stored alert with its raw events parsed for display
#[derive(Serialize, ToSchema)]
pub struct AlertDetail {
    id: i64,
    scenario: String,
    message: String,
    created_at: DateTime<Utc>,
    host_ip: String,
    entries: Vec<String>,
    entry_type: AlertEntryType,
    #[schema(value_type = Vec<Object>)]
    events: Vec<ParsedEvent>,
}

impl AlertDetail {
    fn from_stored(alert: StoredAlert) -> Self {
        let events = serde_json::from_str::<Vec<AlertEvent>>(&alert.events_json)
            .map(|events| events.iter().map(parse_alert_event).collect())
            .unwrap_or_else(|e| {
                tracing::warn!(alert_id = alert.id, error = %e, "stored events are not valid JSON");
                Vec::new()
            });
        Self {
            id: alert.id,
            scenario: alert.scenario,
            message: alert.message,
            created_at: alert.created_at,
            host_ip: alert.host_ip,
            entries: alert.entries,
            entry_type: alert.entry_type,
            events,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DeleteDecisionResponse {
    id: i64,
    /// Number of decisions LAPI reported as deleted
    nb_deleted: u64,
    /// Whether a local row was marked inactive
    marked_inactive: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    /// completed or skipped
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SyncReport>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Completed(report) => Self {
                status: "completed".to_string(),
                report: Some(report),
            },
            SyncOutcome::Skipped => Self {
                status: "skipped".to_string(),
                report: None,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    error: String,
}

// Request types

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Ask LAPI for the complete decision set instead of a delta
    #[serde(default)]
    full: bool,
}

// Health

/// Liveness with version and sync state
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = PublicHealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(PublicHealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        auth_mode: state.settings.http.auth.mode.as_str().to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        lapi_configured: state.lapi.is_some(),
        sync: state.engine.as_ref().map(|e| e.state()),
    })
}

/// Reachability and credential check against LAPI
#[utoipa::path(
    get,
    path = "/v1/health/lapi",
    tag = "health",
    responses(
        (status = 200, description = "LAPI connection health", body = ConnectionHealth),
        (status = 503, description = "LAPI is not configured", body = ErrorResponse),
    )
)]
pub async fn lapi_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectionHealth>, AppError> {
    let lapi = state.lapi()?;
    Ok(Json(lapi.check_connection_health().await))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        crate::observability::update_db_pool_metrics(pool);
    }
    crate::observability::gather_metrics()
}

// Decisions

/// List stored decisions, newest first
#[utoipa::path(
    get,
    path = "/v1/decisions",
    tag = "decisions",
    params(
        ("host_ip" = Option<String>, Query, description = "Filter by host address"),
        ("active" = Option<bool>, Query, description = "Filter by active flag"),
        ("origin" = Option<String>, Query, description = "Filter by origin (crowdsec, cscli, ...)"),
        ("type" = Option<String>, Query, description = "Filter by decision type (ban, captcha, ...)"),
    ),
    responses(
        (status = 200, description = "Decisions with host and alert summaries", body = DecisionsListResponse)
    )
)]
pub async fn list_decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<DecisionsListResponse>, AppError> {
    let decisions = state.repo.list_decisions(&query).await?;
    Ok(Json(DecisionsListResponse {
        count: decisions.len(),
        decisions,
    }))
}

/// Alerts linked to a decision, with parsed events
#[utoipa::path(
    get,
    path = "/v1/decisions/{id}/alerts",
    tag = "decisions",
    params(
        ("id" = i64, Path, description = "Decision ID")
    ),
    responses(
        (status = 200, description = "Linked alerts, oldest first", body = Vec<AlertDetail>),
        (status = 404, description = "Decision not found", body = ErrorResponse),
    )
)]
pub async fn get_decision_alerts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AlertDetail>>, AppError> {
    if state.repo.get_decision(id).await?.is_none() {
        return Err(DashboardError::NotFound(format!("decision {}", id)).into());
    }
    let alerts = state.repo.get_decision_alerts(id).await?;
    Ok(Json(alerts.into_iter().map(AlertDetail::from_stored).collect()))
}

/// Delete a decision in LAPI, mark it inactive locally and schedule a full sync
#[utoipa::path(
    delete,
    path = "/v1/decisions/{id}",
    tag = "decisions",
    params(
        ("id" = i64, Path, description = "Decision ID")
    ),
    responses(
        (status = 200, description = "Decision deleted", body = DeleteDecisionResponse),
        (status = 404, description = "LAPI reported nothing deleted", body = ErrorResponse),
        (status = 502, description = "LAPI request failed", body = ErrorResponse),
        (status = 503, description = "LAPI or watcher credentials not configured", body = ErrorResponse),
    )
)]
pub async fn delete_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteDecisionResponse>, AppError> {
    let lapi = state.lapi()?;
    tracing::info!(decision_id = id, "deleting decision from LAPI");

    let result = lapi.delete_decision_by_id(id).await.inspect_err(|e| {
        tracing::error!(decision_id = id, error = %e, "failed to delete decision");
    })?;
    let nb_deleted = result.deleted_count();

    let marked = state.repo.set_decision_inactive(id).await;

    // LAPI may have removed siblings; let a full sync settle the local state
    state.spawn_sync(true)?;

    let marked_inactive = marked?;
    if !marked_inactive {
        tracing::warn!(decision_id = id, "deleted decision was not stored locally");
    }

    Ok(Json(DeleteDecisionResponse {
        id,
        nb_deleted,
        marked_inactive,
    }))
}

// Hosts

/// List hosts, most recently seen first
#[utoipa::path(
    get,
    path = "/v1/hosts",
    tag = "hosts",
    responses(
        (status = 200, description = "Hosts with active decision counts", body = HostsListResponse)
    )
)]
pub async fn list_hosts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HostsListResponse>, AppError> {
    let hosts = state.repo.list_hosts().await?;
    Ok(Json(HostsListResponse {
        count: hosts.len(),
        hosts,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/hosts/{ip}",
    tag = "hosts",
    params(
        ("ip" = String, Path, description = "Host address")
    ),
    responses(
        (status = 200, description = "Host details", body = Host),
        (status = 404, description = "Host not found", body = ErrorResponse),
    )
)]
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<Json<Host>, AppError> {
    let host = state
        .repo
        .get_host(&ip)
        .await?
        .ok_or_else(|| DashboardError::NotFound(format!("host {}", ip)))?;
    Ok(Json(host))
}

// Sync

/// Run a sync now and wait for it. Answers "skipped" if one is in progress.
#[utoipa::path(
    post,
    path = "/v1/sync",
    tag = "sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Sync outcome", body = SyncResponse),
        (status = 502, description = "LAPI request failed", body = ErrorResponse),
        (status = 503, description = "LAPI is not configured", body = ErrorResponse),
    )
)]
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let engine = Arc::clone(state.engine()?);
    // detached so a client disconnect cannot cancel the run halfway
    let outcome = tokio::spawn(async move { engine.run(request.full).await })
        .await
        .map_err(|e| DashboardError::Internal(format!("sync task failed: {}", e)))??;
    Ok(Json(outcome.into()))
}

// Error handling

pub struct AppError(DashboardError);

impl From<DashboardError> for AppError {
    fn from(e: DashboardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}
