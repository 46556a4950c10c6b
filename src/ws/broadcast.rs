use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::WsMessage;
use crate::error::Result;
use crate::observability::{WS_DROPPED, WS_SUBSCRIBERS};

/// Frames buffered per subscriber before it counts as stalled
const SUBSCRIBER_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Decisions,
    Hosts,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decisions => "decisions",
            Self::Hosts => "hosts",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "decisions" => Ok(Self::Decisions),
            "hosts" => Ok(Self::Hosts),
            _ => Err(format!("unknown channel: {}", s)),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A live subscription. Dropping the receiver ends it on the next broadcast.
pub struct Subscription {
    pub id: Uuid,
    pub channel: Channel,
    pub rx: mpsc::Receiver<Arc<str>>,
}

/// Fan-out of serialized frames to per-channel subscribers.
///
/// Delivery never blocks: a subscriber whose buffer is full or whose
/// receiver is gone is removed on the spot.
pub struct Broadcaster {
    channels: Mutex<HashMap<Channel, HashMap<Uuid, mpsc::Sender<Arc<str>>>>>,
    buffer: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_buffer(SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, channel: Channel) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let subscribers = channels.entry(channel).or_default();
        subscribers.insert(id, tx);
        WS_SUBSCRIBERS
            .with_label_values(&[channel.as_str()])
            .set(subscribers.len() as f64);
        tracing::debug!(%id, channel = %channel, "subscriber registered");
        Subscription { id, channel, rx }
    }

    pub fn unsubscribe(&self, channel: Channel, id: Uuid) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subscribers) = channels.get_mut(&channel) {
            subscribers.remove(&id);
            WS_SUBSCRIBERS
                .with_label_values(&[channel.as_str()])
                .set(subscribers.len() as f64);
            if subscribers.is_empty() {
                channels.remove(&channel);
            }
        }
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel)
            .map_or(0, HashMap::len)
    }

    /// Serialize once and hand the frame to every subscriber of `channel`.
    /// Returns the number of successful deliveries.
    pub fn broadcast<T: Serialize + ?Sized>(&self, channel: Channel, payload: &T) -> Result<usize> {
        let frame: Arc<str> = serde_json::to_string(payload)?.into();
        Ok(self.send_frame(channel, frame))
    }

    pub fn publish(&self, message: &WsMessage) -> Result<usize> {
        self.broadcast(message.channel(), message)
    }

    fn send_frame(&self, channel: Channel, frame: Arc<str>) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(subscribers) = channels.get_mut(&channel) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&frame)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                tracing::debug!(%id, channel = %channel, error = %e, "dropping subscriber");
                WS_DROPPED.with_label_values(&[channel.as_str()]).inc();
                false
            }
        });

        WS_SUBSCRIBERS
            .with_label_values(&[channel.as_str()])
            .set(subscribers.len() as f64);
        if subscribers.is_empty() {
            channels.remove(&channel);
        }
        delivered
    }
}
