//! Reverse-proxy access logs (`log_type: http_access-log`). Entries are the
//! distinct requested paths.

use serde::Serialize;

use super::common::{Meta, present, push_unique};
use super::{AlertTypeHandler, EventDetails, EventKind};
use crate::domain::AlertEntryType;
use crate::lapi::{AlertEvent, LapiAlert};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_verb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traefik_router_name: Option<String>,
}

pub(super) const HANDLER: AlertTypeHandler = AlertTypeHandler {
    kind: EventKind::Http,
    entry_type: AlertEntryType::Paths,
    extract_entries,
    parse_event,
};

fn extract_entries(alert: &LapiAlert) -> Vec<String> {
    let mut paths = Vec::new();
    for event in &alert.events {
        if let Some(path) = event.meta.iter().find(|m| m.key == "http_path") {
            if !path.value.is_empty() && path.value != "-" {
                push_unique(&mut paths, path.value.clone());
            }
        }
    }
    paths
}

fn parse_event(_event: &AlertEvent, meta: &Meta<'_>) -> EventDetails {
    EventDetails::Http(HttpDetails {
        http_verb: present(meta.get("http_verb")),
        http_path: present(meta.get("http_path")),
        http_status: meta.get("http_status").and_then(|s| s.trim().parse().ok()),
        http_user_agent: present(meta.get("http_user_agent")),
        traefik_router_name: present(meta.get("traefik_router_name")),
    })
}
