use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    capabilities::{Broadcaster, Registrar},
    clients::ClientRegistry,
    errors::HubError,
};
use crate::config::HubConfig;
use crate::event::{
    DispatchReport, EventMessage, EventType, HandlerContext, HandlerRegistry, MessageHandler,
};

/// The central event hub
///
/// Producers publish through [`Broadcaster`]; server-side consumers attach
/// through [`Registrar`]; the transport feeds inbound client frames into
/// [`EventHub::deliver`] and drains each client's queue.
///
/// Replies follow a convention rather than a contract: a handler answering a
/// request sets `ref_id` to the request id and `client_id` to the sender,
/// which routes the reply to that one client. No table of outstanding
/// requests is kept and nothing times out.
pub struct EventHub {
    handlers: HandlerRegistry,
    clients: ClientRegistry,
    running: AtomicBool,
}

impl EventHub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            handlers: HandlerRegistry::new().with_handler_timeout(config.handler_timeout),
            clients: ClientRegistry::new(config.client_queue_capacity),
            running: AtomicBool::new(true),
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Entry point for events received from a connected client
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn deliver(
        &self,
        client_id: &str,
        event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> DispatchReport {
        self.handlers
            .deliver(
                &HandlerContext::from_client(),
                client_id,
                event_type,
                payload,
                message_id,
            )
            .await
    }

    /// Sends a new message to every subscriber of `event_type`
    pub async fn send_to_type(
        &self,
        event_type: EventType,
        message: impl Into<String> + Send,
        body: Value,
    ) -> Result<(), HubError> {
        self.broadcast_message(EventMessage::new(event_type, message, body))
            .await
    }

    /// Sends a new message to a single client
    pub async fn send_to_client(
        &self,
        client_id: &str,
        event_type: EventType,
        message: impl Into<String> + Send,
        body: Value,
    ) -> Result<(), HubError> {
        self.broadcast_message(EventMessage::new(event_type, message, body).to_client(client_id))
            .await
    }

    /// Sends a new message to every connected client
    pub async fn send_to_all(
        &self,
        message: impl Into<String> + Send,
        body: Value,
    ) -> Result<(), HubError> {
        self.send_to_type(EventType::Global, message, body).await
    }

    /// Disconnects every client and stops routing to clients
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let disconnected = self.clients.disconnect_all().await;
        info!(disconnected = disconnected, "Event hub shut down");
    }

    /// Runs the in-process handlers for a subscription-routed message
    async fn dispatch_to_handlers(&self, message: &EventMessage) {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Failed to serialize message for handlers"
                );
                return;
            }
        };

        self.handlers
            .deliver(
                &HandlerContext::from_hub(),
                "",
                message.event_type,
                &payload,
                &message.id,
            )
            .await;
    }
}

#[async_trait]
impl Broadcaster for EventHub {
    async fn broadcast_message(&self, mut message: EventMessage) -> Result<(), HubError> {
        message.validate()?;
        message.ensure_identity();

        if !self.is_running() {
            warn!(
                message_id = %message.id,
                event_type = %message.event_type,
                "Event hub is not running, dropping message"
            );
            return Ok(());
        }

        debug!(
            message_id = %message.id,
            event_type = %message.event_type,
            client_id = ?message.client_id,
            ref_id = ?message.ref_id,
            "Broadcasting message"
        );

        // Unicast messages are replies for one external client; handing them
        // back to handlers would let a handler answer its own reply.
        if !message.is_unicast() {
            self.dispatch_to_handlers(&message).await;
        }

        self.clients.broadcast(Arc::new(message)).await;
        Ok(())
    }
}

#[async_trait]
impl Registrar for EventHub {
    async fn register_handler(&self, event_types: &[EventType], handler: Arc<dyn MessageHandler>) {
        self.handlers.register(event_types, handler).await;
    }
}
