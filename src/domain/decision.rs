use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// What LAPI asks bouncers to do with a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecisionType {
    Ban,
    Captcha,
    Allow,
    /// Any type this build does not know about, kept verbatim
    Other(String),
}

impl DecisionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ban => "ban",
            Self::Captcha => "captcha",
            Self::Allow => "allow",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for DecisionType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ban" => Self::Ban,
            "captcha" => Self::Captcha,
            "allow" | "whitelist" => Self::Allow,
            _ => Self::Other(s),
        }
    }
}

impl From<DecisionType> for String {
    fn from(t: DecisionType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which component of the security engine produced a decision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecisionOrigin {
    Crowdsec,
    Cscli,
    Other(String),
}

impl DecisionOrigin {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Crowdsec => "crowdsec",
            Self::Cscli => "cscli",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for DecisionOrigin {
    fn from(s: String) -> Self {
        match s.as_str() {
            "crowdsec" => Self::Crowdsec,
            "cscli" => Self::Cscli,
            _ => Self::Other(s),
        }
    }
}

impl From<DecisionOrigin> for String {
    fn from(o: DecisionOrigin) -> Self {
        o.as_str().to_string()
    }
}

impl std::fmt::Display for DecisionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decision as stored locally. `active == false` rows are history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    pub id: i64,
    pub host_ip: String,
    #[schema(value_type = String, example = "ban")]
    pub decision_type: DecisionType,
    #[schema(value_type = String, example = "crowdsec")]
    pub origin: DecisionOrigin,
    pub scenario: String,
    /// Remaining duration as last reported by LAPI, e.g. "3h59m43.19s"
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Raw database row for decisions
#[derive(Debug, Clone, FromRow)]
pub struct DecisionRow {
    pub id: i64,
    pub host_ip: String,
    pub decision_type: String,
    pub origin: String,
    pub scenario: String,
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Decision {
    pub fn from_row(row: DecisionRow) -> Self {
        Self {
            id: row.id,
            host_ip: row.host_ip,
            decision_type: DecisionType::from(row.decision_type),
            origin: DecisionOrigin::from(row.origin),
            scenario: row.scenario,
            duration: row.duration,
            created_at: row.created_at,
            expires_at: row.expires_at,
            active: row.active,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Write model for decision upserts, built from a polled LAPI decision
#[derive(Debug, Clone)]
pub struct DecisionUpsert {
    pub id: i64,
    pub host_ip: String,
    pub decision_type: DecisionType,
    pub origin: DecisionOrigin,
    pub scenario: String,
    pub duration: String,
    pub expires_at: DateTime<Utc>,
    /// Alerts to link to this decision; they must already be stored
    pub alert_ids: Vec<i64>,
}

/// Filters accepted by the decision listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionQuery {
    pub host_ip: Option<String>,
    pub active: Option<bool>,
    pub origin: Option<String>,
    #[serde(rename = "type")]
    pub decision_type: Option<String>,
}

impl DecisionQuery {
    pub fn matches(&self, d: &Decision) -> bool {
        self.host_ip.as_deref().is_none_or(|ip| d.host_ip == ip)
            && self.active.is_none_or(|a| d.active == a)
            && self.origin.as_deref().is_none_or(|o| d.origin.as_str() == o)
            && self
                .decision_type
                .as_deref()
                .is_none_or(|t| d.decision_type == DecisionType::from(t.to_string()))
    }
}
