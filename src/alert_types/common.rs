use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::lapi::AlertEvent;

/// Flattened event meta, keyed by meta key
pub type Meta<'a> = HashMap<&'a str, &'a str>;

/// The log format that produced an alert's events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Http,
    FirewallPf,
    Ssh,
    Unknown,
}

/// `-` is how parsers mark an empty field
pub fn present(value: Option<&&str>) -> Option<String> {
    match value {
        Some(v) if *v != "-" => Some((*v).to_string()),
        _ => None,
    }
}

/// Pick the kind from `log_type`, falling back to the presence of
/// kind-specific keys.
pub fn detect(meta: &Meta<'_>) -> EventKind {
    match meta.get("log_type").copied() {
        Some("http_access-log") => EventKind::Http,
        Some("pf_drop" | "pf_pass") => EventKind::FirewallPf,
        Some("ssh_auth" | "auth") => EventKind::Ssh,
        _ if meta.contains_key("http_verb") || meta.contains_key("http_path") => EventKind::Http,
        _ if meta.contains_key("iface") || meta.contains_key("rulenr") => EventKind::FirewallPf,
        _ if meta.contains_key("ssh_user") => EventKind::Ssh,
        _ => EventKind::Unknown,
    }
}

/// Fields every event kind carries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonFields {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn_org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_in_eu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datasource_path: Option<String>,
}

/// Accepts RFC 3339 (meta) and Go's `2006-01-02 15:04:05.999 -0700 MST`
/// (event) layouts.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    // drop the trailing zone abbreviation, keep the numeric offset
    let mut parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() == 4 {
        parts.pop();
    }
    let trimmed = parts.join(" ");
    if let Ok(ts) = DateTime::parse_from_str(&trimmed, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn parse_common(meta: &Meta<'_>, event: &AlertEvent) -> CommonFields {
    let raw_ts = meta
        .get("timestamp")
        .copied()
        .or(event.timestamp.as_deref());
    CommonFields {
        timestamp: raw_ts.and_then(parse_timestamp).unwrap_or_else(Utc::now),
        source_ip: present(meta.get("source_ip")),
        asn_number: present(meta.get("ASNNumber")),
        asn_org: present(meta.get("ASNOrg")),
        iso_code: present(meta.get("IsoCode")),
        is_in_eu: meta.get("IsInEU").map(|v| v.eq_ignore_ascii_case("true")),
        source_range: present(meta.get("SourceRange")),
        datasource_path: present(meta.get("datasource_path")),
    }
}

/// Append `value` unless already seen, keeping first-seen order
pub(super) fn push_unique(seen: &mut Vec<String>, value: String) {
    if !seen.contains(&value) {
        seen.push(value);
    }
}
