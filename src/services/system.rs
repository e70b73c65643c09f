use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::event::{DeliveryOrigin, EventMessage, EventType, HandlerContext, MessageHandler};
use crate::hub::{Broadcaster, HubError, Registrar};

#[derive(Debug, Deserialize)]
struct SystemRequest {
    #[serde(default)]
    message: String,
}

/// Handles `system` requests from clients
///
/// Currently only `client-id`, which tells a client the id the hub knows it by.
pub struct SystemService {
    broadcaster: Arc<dyn Broadcaster>,
}

impl SystemService {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub async fn register(self: Arc<Self>, registrar: &dyn Registrar) {
        registrar.register_handler(&[EventType::System], self).await;
    }
}

#[async_trait]
impl MessageHandler for SystemService {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        client_id: &str,
        _event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> Result<(), HubError> {
        if ctx.origin == DeliveryOrigin::Hub || client_id.is_empty() {
            return Ok(());
        }

        let reply = match serde_json::from_slice::<SystemRequest>(payload) {
            Ok(request) if request.message == "client-id" => EventMessage::new(
                EventType::System,
                "client-id",
                json!({ "client-id": client_id }),
            ),
            Ok(request) => {
                debug!(client_id = %client_id, message = %request.message, "Ignoring system message");
                return Ok(());
            }
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Failed to parse system message");
                EventMessage::new(EventType::System, "error", json!({ "error": e.to_string() }))
            }
        };

        self.broadcaster
            .broadcast_message(reply.to_client(client_id).in_reply_to(message_id))
            .await
    }

    fn name(&self) -> &'static str {
        "SystemService"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Mutex<Vec<EventMessage>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn broadcast_message(&self, message: EventMessage) -> Result<(), HubError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    async fn handle(payload: &[u8]) -> Vec<EventMessage> {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let service = SystemService::new(recorder.clone());
        service
            .handle(
                &HandlerContext::from_client(),
                "client-42",
                EventType::System,
                payload,
                "req-9",
            )
            .await
            .unwrap();
        let sent = recorder.sent.lock().unwrap().clone();
        sent
    }

    #[tokio::test]
    async fn test_client_id_request_echoes_id() {
        let sent = handle(br#"{"message":"client-id"}"#).await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "client-id");
        assert_eq!(sent[0].body, json!({"client-id": "client-42"}));
        assert_eq!(sent[0].client_id.as_deref(), Some("client-42"));
        assert_eq!(sent[0].ref_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn test_unparseable_request_gets_error_reply() {
        let sent = handle(b"{{{").await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "error");
        assert!(sent[0].body["error"].is_string());
        assert_eq!(sent[0].client_id.as_deref(), Some("client-42"));
    }

    #[tokio::test]
    async fn test_unknown_request_is_ignored() {
        assert!(handle(br#"{"message":"reboot"}"#).await.is_empty());
    }
}
