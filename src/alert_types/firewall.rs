//! Packet filter logs (`log_type: pf_drop | pf_pass`). The parser aggregates
//! destination ports into the alert-level `dst_port` meta as a JSON list.

use serde::Serialize;

use super::common::{Meta, present};
use super::{AlertTypeHandler, EventDetails, EventKind};
use crate::domain::AlertEntryType;
use crate::lapi::{AlertEvent, LapiAlert};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirewallDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pf_interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pf_rule_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pf_rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pf_machine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pf_service: Option<String>,
}

pub(super) const HANDLER: AlertTypeHandler = AlertTypeHandler {
    kind: EventKind::FirewallPf,
    entry_type: AlertEntryType::Ports,
    extract_entries,
    parse_event,
};

fn extract_entries(alert: &LapiAlert) -> Vec<String> {
    match alert.meta_value("dst_port") {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_event(_event: &AlertEvent, meta: &Meta<'_>) -> EventDetails {
    EventDetails::FirewallPf(FirewallDetails {
        pf_interface: present(meta.get("iface")),
        pf_rule_number: present(meta.get("rulenr")),
        pf_rule_id: present(meta.get("ruleid")),
        pf_machine: present(meta.get("machine")),
        pf_service: present(meta.get("service")),
    })
}
