use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::EventType;

/// Per-broadcast delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages queued for a client
    pub delivered: usize,
    /// Messages discarded because the client's queue was full
    pub dropped: usize,
    /// Messages that hit a closed client queue
    pub failed: usize,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.dropped + self.failed
    }
}

/// Result of an unsubscribe request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeOutcome {
    /// Types the client no longer receives
    pub removed: Vec<EventType>,
    /// Types that were refused (`global` cannot be left)
    pub rejected: Vec<EventType>,
}

/// Snapshot of one connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub subscribes_to_all: bool,
    pub event_subscriptions: Vec<EventType>,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
}

/// Statistics about the hub's client side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterStats {
    pub total_clients: usize,
    pub total_subscriptions: usize,
    /// Number of subscribers per type
    pub type_stats: BTreeMap<EventType, usize>,
    pub clients: Vec<ClientInfo>,
    /// Total messages queued for clients since start
    pub messages_sent: u64,
    /// Total messages dropped on full queues since start
    pub messages_dropped: u64,
    /// Total messages that found a closed queue since start
    pub delivery_failures: u64,
    pub start_time: DateTime<Utc>,
    pub uptime: String,
}

/// Renders an uptime such as `1h2m3s`
pub(crate) fn format_uptime(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
