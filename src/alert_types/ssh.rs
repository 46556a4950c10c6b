//! Auth logs (`log_type: ssh_auth | auth`). Entries are the targeted usernames.

use serde::Serialize;

use super::common::{Meta, present, push_unique};
use super::{AlertTypeHandler, EventDetails, EventKind};
use crate::domain::AlertEntryType;
use crate::lapi::{AlertEvent, LapiAlert};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SshDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_service: Option<String>,
}

pub(super) const HANDLER: AlertTypeHandler = AlertTypeHandler {
    kind: EventKind::Ssh,
    entry_type: AlertEntryType::Usernames,
    extract_entries,
    parse_event,
};

fn user<'a>(meta: &Meta<'a>) -> Option<String> {
    present(meta.get("ssh_user").or_else(|| meta.get("user")))
}

fn extract_entries(alert: &LapiAlert) -> Vec<String> {
    let mut users = Vec::new();
    for event in &alert.events {
        if let Some(u) = user(&event.meta_map()) {
            push_unique(&mut users, u);
        }
    }
    users
}

fn parse_event(_event: &AlertEvent, meta: &Meta<'_>) -> EventDetails {
    EventDetails::Ssh(SshDetails {
        ssh_user: user(meta),
        ssh_service: present(meta.get("service")),
    })
}
