use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use eventhub::{
    event::{DispatchReport, EventMessage, EventType},
    hub::{Broadcaster, ClientRegistration, ClientSpec, EventHub, Subscription},
    services::{HealthService, SystemService},
    AppState, HubConfig,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub hub: Arc<EventHub>,
    pub config: Arc<HubConfig>,
}

pub struct TestSetupBuilder {
    config: HubConfig,
    with_services: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            with_services: false,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.client_queue_capacity = capacity;
        self
    }

    pub fn with_single_connection_per_ip(mut self) -> Self {
        self.config.allow_multiple_connections_per_ip = false;
        self
    }

    /// Registers the health and system handlers on the hub
    pub fn with_services(mut self) -> Self {
        self.with_services = true;
        self
    }

    pub async fn build(self) -> TestSetup {
        let hub = Arc::new(EventHub::new(&self.config));

        if self.with_services {
            let broadcaster: Arc<dyn Broadcaster> = hub.clone();
            Arc::new(HealthService::new(Arc::clone(&broadcaster)))
                .register(hub.as_ref())
                .await;
            Arc::new(SystemService::new(broadcaster))
                .register(hub.as_ref())
                .await;
        }

        TestSetup {
            hub,
            config: Arc::new(self.config),
        }
    }
}

impl TestSetup {
    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::clone(&self.hub), Arc::clone(&self.config))
    }

    pub async fn connect(&self, client_id: &str, subscription: Subscription) -> ClientRegistration {
        self.hub
            .clients()
            .register(ClientSpec::new(subscription).with_id(client_id))
            .await
            .expect("client registration should succeed")
    }

    /// Simulates a frame arriving from `client_id`
    pub async fn send_from_client(
        &self,
        client_id: &str,
        event_type: EventType,
        frame: Value,
        message_id: &str,
    ) -> DispatchReport {
        let payload = serde_json::to_vec(&frame).expect("frame should serialize");
        self.hub
            .deliver(client_id, event_type, &payload, message_id)
            .await
    }
}

/// Waits briefly for the next message on a client queue
pub async fn next_message(receiver: &mut mpsc::Receiver<Arc<EventMessage>>) -> Option<Arc<EventMessage>> {
    tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .ok()
        .flatten()
}

/// Everything currently queued for a client, without waiting
pub fn drain(receiver: &mut mpsc::Receiver<Arc<EventMessage>>) -> Vec<Arc<EventMessage>> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}
