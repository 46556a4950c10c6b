use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::domain::{DecisionOrigin, DecisionType};

/// LAPI sends `null` instead of `[]` for empty lists
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decision as returned by the bouncer endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapiDecision {
    pub id: i64,
    pub origin: DecisionOrigin,
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub scope: String,
    pub value: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub simulated: bool,
}

/// `GET /v1/decisions/stream` body with `null` lists normalized to empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStream {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new: Vec<LapiDecision>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deleted: Vec<LapiDecision>,
}

/// Options for the stream endpoint
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Request the complete current state instead of a delta
    pub startup: bool,
    pub origins: Option<String>,
    pub scopes: Option<String>,
}

/// Query filters for `GET /v1/decisions`. All optional.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub decision_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origins: Option<String>,
}

/// Query filters for `GET /v1/alerts`
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_active_decision: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// One log-line equivalent inside an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Vec<MetaEntry>,
}

impl AlertEvent {
    pub fn meta_map(&self) -> HashMap<&str, &str> {
        self.meta
            .iter()
            .map(|m| (m.key.as_str(), m.value.as_str()))
            .collect()
    }
}

/// Where an alert's traffic came from, with LAPI's own enrichment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSource {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub cn: Option<String>,
    #[serde(default)]
    pub as_number: Option<String>,
    #[serde(default)]
    pub as_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Decision reference embedded in an alert. Only the id matters for linking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecisionRef {
    pub id: i64,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapiAlert {
    pub id: i64,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source: AlertSource,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<AlertEvent>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Vec<MetaEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub decisions: Vec<AlertDecisionRef>,
}

impl LapiAlert {
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WatcherLoginRequest<'a> {
    pub machine_id: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WatcherAuthResponse {
    #[allow(dead_code)]
    #[serde(default)]
    pub code: i64,
    pub expire: DateTime<Utc>,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDecisionResponse {
    #[serde(rename = "nbDeleted")]
    pub nb_deleted: String,
}

impl DeleteDecisionResponse {
    pub fn deleted_count(&self) -> u64 {
        self.nb_deleted.trim().parse().unwrap_or(0)
    }
}

/// Closed set of reasons a health check can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthError {
    InvalidApiToken,
    SecurityEngineServerError,
    SecurityEngineUnreachable,
    UnexpectedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionHealth {
    pub status: HealthStatus,
    pub error: Option<HealthError>,
}

impl ConnectionHealth {
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            error: None,
        }
    }

    pub fn error(error: HealthError) -> Self {
        Self {
            status: HealthStatus::Error,
            error: Some(error),
        }
    }

    /// Classify a HEAD response status
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::ok(),
            403 => Self::error(HealthError::InvalidApiToken),
            500.. => Self::error(HealthError::SecurityEngineServerError),
            _ => Self::error(HealthError::UnexpectedStatus),
        }
    }
}
