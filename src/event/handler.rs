use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::EventType;
use crate::hub::HubError;

/// Where a dispatched event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOrigin {
    /// A frame received from a connected client
    Client,
    /// A message broadcast by an in-process producer
    Hub,
}

/// Per-dispatch information handed to every handler
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub origin: DeliveryOrigin,
    pub received_at: DateTime<Utc>,
}

impl HandlerContext {
    pub fn from_client() -> Self {
        Self {
            origin: DeliveryOrigin::Client,
            received_at: Utc::now(),
        }
    }

    pub fn from_hub() -> Self {
        Self {
            origin: DeliveryOrigin::Hub,
            received_at: Utc::now(),
        }
    }
}

/// Trait for in-process consumers of event messages
///
/// Handlers receive the raw serialized payload and decode it themselves.
/// They are expected to return quickly; anything long-running should be
/// spawned onto its own task by the handler. An `Err` or a panic is logged
/// by the registry and never reaches other handlers or the caller.
///
/// A handler that wants to answer a client builds a new message with
/// `ref_id = message_id` and `client_id = client_id` and broadcasts it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        client_id: &str,
        event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> Result<(), HubError>;

    /// Get a human-readable name for this handler (for logging/debugging)
    fn name(&self) -> &'static str;
}
