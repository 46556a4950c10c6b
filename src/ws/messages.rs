use serde::Serialize;

use super::Channel;
use crate::domain::{DecisionView, HostView};

/// Live-update frames. Each carries the full current collection for its channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    /// Active decisions with host and alert summaries
    Decisions(Vec<DecisionView>),

    /// All hosts with their active decision count
    Hosts(Vec<HostView>),
}

impl WsMessage {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Decisions(_) => Channel::Decisions,
            Self::Hosts(_) => Channel::Hosts,
        }
    }
}
