use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Describes what `entries` holds for a stored alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertEntryType {
    Paths,
    Ports,
    Usernames,
    None,
}

impl AlertEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paths => "paths",
            Self::Ports => "ports",
            Self::Usernames => "usernames",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for AlertEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertEntryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "paths" => Ok(Self::Paths),
            "ports" => Ok(Self::Ports),
            "usernames" => Ok(Self::Usernames),
            "none" => Ok(Self::None),
            _ => Err(format!("unknown entry type: {}", s)),
        }
    }
}

/// An alert persisted at sync time. Insert-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub scenario: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub host_ip: String,
    pub entries: Vec<String>,
    pub entry_type: AlertEntryType,
    /// Raw LAPI event list, parsed only when a detail view asks for it
    pub events_json: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub scenario: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub host_ip: String,
    pub entries_json: String,
    pub entry_type: String,
    pub events_json: String,
}

impl StoredAlert {
    pub fn from_row(row: AlertRow) -> Self {
        let entries = serde_json::from_str(&row.entries_json).unwrap_or_else(|e| {
            tracing::warn!(alert_id = row.id, error = %e, "corrupt entries_json");
            Vec::new()
        });
        let entry_type = row.entry_type.parse().unwrap_or(AlertEntryType::None);
        Self {
            id: row.id,
            scenario: row.scenario,
            message: row.message,
            created_at: row.created_at,
            host_ip: row.host_ip,
            entries,
            entry_type,
            events_json: row.events_json,
        }
    }

    pub fn summary(&self) -> AlertSummary {
        AlertSummary {
            id: self.id,
            scenario: self.scenario.clone(),
            entries: self.entries.clone(),
            entry_type: self.entry_type,
        }
    }
}

/// Compact alert info attached to decision listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertSummary {
    pub id: i64,
    pub scenario: String,
    pub entries: Vec<String>,
    pub entry_type: AlertEntryType,
}
