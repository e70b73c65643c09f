use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::errors::HubError;
use super::models::{format_uptime, ClientInfo, DeliveryReport, EmitterStats, UnsubscribeOutcome};
use crate::event::{EventMessage, EventType};

/// Default number of messages buffered per client before dropping
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 1024;

/// Largest per-client queue; tokio channels cannot hold more permits than this
pub const MAX_CLIENT_QUEUE_CAPACITY: usize = 1 << 20;

/// The event types a client receives
///
/// `global` always matches, whatever the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    All,
    Types(HashSet<EventType>),
}

impl Subscription {
    pub fn types(event_types: impl IntoIterator<Item = EventType>) -> Self {
        Subscription::Types(event_types.into_iter().collect())
    }

    /// Only the mandatory `global` type
    pub fn global_only() -> Self {
        Subscription::Types(HashSet::from([EventType::Global]))
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Types(types) => {
                event_type == EventType::Global || types.contains(&event_type)
            }
        }
    }

    /// Sorted list of the types this subscription covers
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = match self {
            Subscription::All => EventType::all(),
            Subscription::Types(types) => types.iter().copied().collect(),
        };
        if !types.contains(&EventType::Global) {
            types.push(EventType::Global);
        }
        types.sort();
        types
    }
}

/// Everything needed to register a client
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub client_id: Option<String>,
    pub subscription: Subscription,
    pub remote_ip: Option<String>,
    /// Refuse the client if another one is already connected from `remote_ip`
    pub exclusive_ip: bool,
}

impl ClientSpec {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            client_id: None,
            subscription,
            remote_ip: None,
            exclusive_ip: false,
        }
    }

    pub fn with_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_remote_ip(mut self, remote_ip: impl Into<String>) -> Self {
        self.remote_ip = Some(remote_ip.into());
        self
    }

    pub fn with_exclusive_ip(mut self, exclusive: bool) -> Self {
        self.exclusive_ip = exclusive;
        self
    }
}

/// Handed back to the transport when a client is registered
///
/// The transport owns the receiver and drains it from the client's writer
/// task. The hub keeps only the sending half.
#[derive(Debug)]
pub struct ClientRegistration {
    pub client_id: String,
    pub subscriptions: Vec<EventType>,
    pub receiver: mpsc::Receiver<Arc<EventMessage>>,
}

struct ClientEntry {
    sender: mpsc::Sender<Arc<EventMessage>>,
    subscription: Subscription,
    remote_ip: Option<String>,
    connected_at: DateTime<Utc>,
    delivered: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

/// What a broadcast needs from an entry, copied out under the read lock
struct DeliveryTarget {
    client_id: String,
    sender: mpsc::Sender<Arc<EventMessage>>,
    delivered: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl ClientEntry {
    fn target(&self, client_id: &str) -> DeliveryTarget {
        DeliveryTarget {
            client_id: client_id.to_string(),
            sender: self.sender.clone(),
            delivered: Arc::clone(&self.delivered),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

/// Tracks connected clients and fans messages out to them
///
/// Each client gets a bounded queue. When a queue is full the message is
/// dropped for that client only and counted; the broadcaster never waits.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientEntry>>,
    queue_capacity: usize,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    delivery_failures: AtomicU64,
    started_at: DateTime<Utc>,
}

impl ClientRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.clamp(1, MAX_CLIENT_QUEUE_CAPACITY),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Adds a client and returns the receiving end of its queue
    ///
    /// The per-IP rule of an exclusive spec is checked under the same write
    /// lock as the insert, so two connections from one address cannot both pass.
    pub async fn register(&self, spec: ClientSpec) -> Result<ClientRegistration, HubError> {
        let client_id = spec
            .client_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(crate::event::generate_id);

        let mut clients = self.clients.write().await;
        if clients.contains_key(&client_id) {
            warn!(client_id = %client_id, "Attempted to register duplicate client id");
            return Err(HubError::DuplicateClient(client_id));
        }
        if spec.exclusive_ip {
            if let Some(ip) = spec.remote_ip.as_deref().filter(|ip| !ip.is_empty()) {
                if clients
                    .values()
                    .any(|entry| entry.remote_ip.as_deref() == Some(ip))
                {
                    warn!(client_id = %client_id, remote_ip = %ip, "Connection limit reached for IP");
                    return Err(HubError::ConnectionLimit(ip.to_string()));
                }
            }
        }

        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let subscriptions = spec.subscription.event_types();

        clients.insert(
            client_id.clone(),
            ClientEntry {
                sender,
                subscription: spec.subscription,
                remote_ip: spec.remote_ip,
                connected_at: Utc::now(),
                delivered: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
        );

        info!(
            client_id = %client_id,
            subscriptions = ?subscriptions,
            total_clients = clients.len(),
            "Registered client"
        );

        Ok(ClientRegistration {
            client_id,
            subscriptions,
            receiver,
        })
    }

    /// Removes a client; dropping its sender ends the client's writer loop
    pub async fn unregister(&self, client_id: &str) -> bool {
        let removed = self.clients.write().await.remove(client_id);
        match removed {
            Some(entry) => {
                info!(
                    client_id = %client_id,
                    dropped = entry.dropped.load(Ordering::Relaxed),
                    "Unregistered client"
                );
                true
            }
            None => {
                warn!(client_id = %client_id, "Attempted to unregister unknown client");
                false
            }
        }
    }

    /// Disconnects every client, returning how many were removed
    pub async fn disconnect_all(&self) -> usize {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        info!(count = count, "Disconnected all clients");
        count
    }

    pub async fn has_client(&self, client_id: &str) -> bool {
        self.clients.read().await.contains_key(client_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// True if some connected client registered from `ip`
    pub async fn has_active_connection_from_ip(&self, ip: &str) -> bool {
        if ip.is_empty() {
            return false;
        }
        self.clients
            .read()
            .await
            .values()
            .any(|entry| entry.remote_ip.as_deref() == Some(ip))
    }

    /// Adds types to a client's subscription
    pub async fn subscribe(
        &self,
        client_id: &str,
        event_types: &[EventType],
    ) -> Result<Vec<EventType>, HubError> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| HubError::ClientNotFound(client_id.to_string()))?;

        if let Subscription::Types(types) = &mut entry.subscription {
            types.extend(event_types.iter().copied());
        }

        let subscriptions = entry.subscription.event_types();
        debug!(client_id = %client_id, subscriptions = ?subscriptions, "Client subscribed");
        Ok(subscriptions)
    }

    /// Removes types from a client's subscription
    ///
    /// `global` is never removed and is reported back as rejected. A type the
    /// client was not subscribed to is ignored.
    pub async fn unsubscribe(
        &self,
        client_id: &str,
        event_types: &[EventType],
    ) -> Result<UnsubscribeOutcome, HubError> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| HubError::ClientNotFound(client_id.to_string()))?;

        let mut outcome = UnsubscribeOutcome::default();
        if let Subscription::All = entry.subscription {
            entry.subscription = Subscription::types(EventType::all());
        }

        if let Subscription::Types(types) = &mut entry.subscription {
            for event_type in event_types {
                if *event_type == EventType::Global {
                    if !outcome.rejected.contains(event_type) {
                        outcome.rejected.push(*event_type);
                    }
                    continue;
                }
                if types.remove(event_type) {
                    outcome.removed.push(*event_type);
                }
            }
        }

        if !outcome.removed.is_empty() {
            info!(client_id = %client_id, removed = ?outcome.removed, "Client unsubscribed");
        }
        if !outcome.rejected.is_empty() {
            warn!(client_id = %client_id, "Client cannot unsubscribe from global event type");
        }

        Ok(outcome)
    }

    /// Delivers `message` to its target client or to every matching subscriber
    ///
    /// Senders are copied out under the read lock and written to after it is
    /// released. Unicast to an unknown client is a silent drop.
    pub async fn broadcast(&self, message: Arc<EventMessage>) -> DeliveryReport {
        let targets: Vec<DeliveryTarget> = {
            let clients = self.clients.read().await;
            match message.client_id.as_deref() {
                Some(client_id) => match clients.get(client_id) {
                    Some(entry) => vec![entry.target(client_id)],
                    None => {
                        debug!(
                            client_id = %client_id,
                            message_id = %message.id,
                            "Target client not connected, dropping message"
                        );
                        Vec::new()
                    }
                },
                None => clients
                    .iter()
                    .filter(|(_, entry)| entry.subscription.matches(message.event_type))
                    .map(|(client_id, entry)| entry.target(client_id))
                    .collect(),
            }
        };

        let mut report = DeliveryReport::default();
        for target in targets {
            match target.sender.try_send(Arc::clone(&message)) {
                Ok(()) => {
                    target.delivered.fetch_add(1, Ordering::Relaxed);
                    self.messages_sent.fetch_add(1, Ordering::Relaxed);
                    report.delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    target.dropped.fetch_add(1, Ordering::Relaxed);
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    warn!(
                        client_id = %target.client_id,
                        message_id = %message.id,
                        "Client send queue is full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    report.failed += 1;
                    let error = HubError::Delivery {
                        client_id: target.client_id.clone(),
                        reason: "connection closed".to_string(),
                    };
                    warn!(message_id = %message.id, error = %error, "Delivery failed");
                }
            }
        }

        debug!(
            message_id = %message.id,
            event_type = %message.event_type,
            delivered = report.delivered,
            dropped = report.dropped,
            failed = report.failed,
            "Broadcast to clients complete"
        );

        report
    }

    /// Point-in-time statistics for every connected client
    pub async fn snapshot(&self) -> EmitterStats {
        let clients = self.clients.read().await;

        let mut type_stats: BTreeMap<EventType, usize> = BTreeMap::new();
        let mut infos: Vec<ClientInfo> = Vec::with_capacity(clients.len());
        for (client_id, entry) in clients.iter() {
            let event_subscriptions = entry.subscription.event_types();
            for event_type in &event_subscriptions {
                *type_stats.entry(*event_type).or_default() += 1;
            }
            infos.push(ClientInfo {
                id: client_id.clone(),
                remote_ip: entry.remote_ip.clone(),
                connected_at: entry.connected_at,
                subscribes_to_all: entry.subscription == Subscription::All,
                event_subscriptions,
                messages_delivered: entry.delivered.load(Ordering::Relaxed),
                messages_dropped: entry.dropped.load(Ordering::Relaxed),
            });
        }
        infos.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));

        EmitterStats {
            total_clients: clients.len(),
            total_subscriptions: type_stats.values().sum(),
            type_stats,
            clients: infos,
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            start_time: self.started_at,
            uptime: format_uptime((Utc::now() - self.started_at).num_seconds()),
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_QUEUE_CAPACITY)
    }
}
