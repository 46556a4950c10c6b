//! Alert-type dispatch.
//!
//! An alert's kind is detected from the meta of its first event. Each kind
//! contributes one [`AlertTypeHandler`]: `extract_entries` runs at sync time
//! and produces the summary stored with the alert, `parse_event` runs when a
//! detail view expands the stored raw events.

mod common;
mod firewall;
mod http;
mod ssh;

use serde::Serialize;

pub use common::{CommonFields, EventKind, Meta, detect, parse_common, parse_timestamp, present};
pub use firewall::FirewallDetails;
pub use http::HttpDetails;
pub use ssh::SshDetails;

use crate::domain::AlertEntryType;
use crate::lapi::{AlertEvent, LapiAlert};

pub struct AlertTypeHandler {
    pub kind: EventKind,
    pub entry_type: AlertEntryType,
    pub extract_entries: fn(&LapiAlert) -> Vec<String>,
    pub parse_event: fn(&AlertEvent, &Meta<'_>) -> EventDetails,
}

static HANDLERS: [AlertTypeHandler; 3] = [http::HANDLER, firewall::HANDLER, ssh::HANDLER];

pub fn handler_for(kind: EventKind) -> Option<&'static AlertTypeHandler> {
    HANDLERS.iter().find(|h| h.kind == kind)
}

/// Kind-specific part of a parsed event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventDetails {
    Http(HttpDetails),
    FirewallPf(FirewallDetails),
    Ssh(SshDetails),
    Unknown,
}

/// Structured event data for the alert detail view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvent {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(flatten)]
    pub details: EventDetails,
}

/// Summary stored with an alert at sync time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertExtract {
    pub entries: Vec<String>,
    pub entry_type: AlertEntryType,
}

impl AlertExtract {
    fn none() -> Self {
        Self {
            entries: Vec::new(),
            entry_type: AlertEntryType::None,
        }
    }
}

pub fn parse_alert_event(event: &AlertEvent) -> ParsedEvent {
    let meta = event.meta_map();
    let details = match handler_for(detect(&meta)) {
        Some(handler) => (handler.parse_event)(event, &meta),
        None => EventDetails::Unknown,
    };
    ParsedEvent {
        common: parse_common(&meta, event),
        details,
    }
}

pub fn extract_alert_data(alert: &LapiAlert) -> AlertExtract {
    let Some(first) = alert.events.first() else {
        return AlertExtract::none();
    };
    match handler_for(detect(&first.meta_map())) {
        Some(handler) => AlertExtract {
            entries: (handler.extract_entries)(alert),
            entry_type: handler.entry_type,
        },
        None => AlertExtract::none(),
    }
}
