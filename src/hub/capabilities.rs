use async_trait::async_trait;
use std::sync::Arc;

use super::errors::HubError;
use crate::event::{EventMessage, EventType, MessageHandler};

/// Capability to publish a message through the hub
///
/// Services depend on this rather than on [`super::EventHub`] so they can be
/// tested against a recording double.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publishes `message` to in-process handlers and connected clients
    ///
    /// Fails only when the message itself is invalid. Per-recipient
    /// delivery problems are logged by the hub and never returned.
    async fn broadcast_message(&self, message: EventMessage) -> Result<(), HubError>;
}

/// Capability to attach in-process handlers to event types
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register_handler(&self, event_types: &[EventType], handler: Arc<dyn MessageHandler>);
}
