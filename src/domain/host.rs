use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A source address that has had at least one decision
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Host {
    pub ip: String,
    pub scope: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Cached count of active decisions for this IP, recomputed after each batch
    pub total_bans: i64,
    pub country: Option<String>,
    pub as_number: Option<String>,
    pub as_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Write model for host upserts. `None` fields never overwrite stored values.
#[derive(Debug, Clone, Default)]
pub struct HostUpsert {
    pub ip: String,
    pub scope: String,
    pub country: Option<String>,
    pub as_number: Option<String>,
    pub as_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Host {
    pub fn from_upsert(h: &HostUpsert, now: DateTime<Utc>) -> Self {
        Self {
            ip: h.ip.clone(),
            scope: h.scope.clone(),
            first_seen: now,
            last_seen: now,
            total_bans: 0,
            country: h.country.clone(),
            as_number: h.as_number.clone(),
            as_name: h.as_name.clone(),
            latitude: h.latitude,
            longitude: h.longitude,
        }
    }

    /// Apply an incoming sighting: scope and last_seen always move,
    /// enrichment only where the incoming value is present.
    pub fn merge(&mut self, h: &HostUpsert, now: DateTime<Utc>) {
        self.scope = h.scope.clone();
        self.last_seen = now;
        if h.country.is_some() {
            self.country = h.country.clone();
        }
        if h.as_number.is_some() {
            self.as_number = h.as_number.clone();
        }
        if h.as_name.is_some() {
            self.as_name = h.as_name.clone();
        }
        if h.latitude.is_some() {
            self.latitude = h.latitude;
        }
        if h.longitude.is_some() {
            self.longitude = h.longitude;
        }
    }
}
