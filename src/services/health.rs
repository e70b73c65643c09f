use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::event::{DeliveryOrigin, EventMessage, EventType, HandlerContext, MessageHandler};
use crate::hub::{Broadcaster, HubError, Registrar};

#[derive(Debug, Deserialize)]
struct HealthRequest {
    #[serde(default)]
    message: String,
}

/// Answers `ping` with `pong`
///
/// Purely reactive: it has no loop and nothing to start or stop.
pub struct HealthService {
    broadcaster: Arc<dyn Broadcaster>,
}

impl HealthService {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub async fn register(self: Arc<Self>, registrar: &dyn Registrar) {
        registrar.register_handler(&[EventType::Health], self).await;
    }
}

#[async_trait]
impl MessageHandler for HealthService {
    #[instrument(skip(self, ctx, payload), fields(origin = ?ctx.origin))]
    async fn handle(
        &self,
        ctx: &HandlerContext,
        client_id: &str,
        event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> Result<(), HubError> {
        // Only client requests get an answer; a health message broadcast by
        // the hub has nobody to reply to.
        if ctx.origin == DeliveryOrigin::Hub || client_id.is_empty() {
            return Ok(());
        }
        if event_type != EventType::Health {
            debug!(event_type = %event_type, "Ignoring non-health event");
            return Ok(());
        }

        let request: HealthRequest = serde_json::from_slice(payload)
            .map_err(|e| HubError::MalformedPayload(e.to_string()))?;

        if request.message != "ping" {
            debug!(message = %request.message, "Ignoring health message");
            return Ok(());
        }

        let pong = EventMessage::new(EventType::Health, "pong", json!("pong"))
            .to_client(client_id)
            .in_reply_to(message_id);
        self.broadcaster.broadcast_message(pong).await
    }

    fn name(&self) -> &'static str {
        "HealthService"
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

    fn service() -> (HealthService, Arc<RecordingBroadcaster>) {
        let recorder = Arc::new(RecordingBroadcaster::default());
        (HealthService::new(recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn test_ping_gets_correlated_pong() {
        let (service, recorder) = service();

        service
            .handle(
                &HandlerContext::from_client(),
                "client-1",
                EventType::Health,
                br#"{"message":"ping"}"#,
                "req-1",
            )
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, EventType::Health);
        assert_eq!(sent[0].message, "pong");
        assert_eq!(sent[0].body, json!("pong"));
        assert_eq!(sent[0].client_id.as_deref(), Some("client-1"));
        assert_eq!(sent[0].ref_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error_without_reply() {
        let (service, recorder) = service();

        let result = service
            .handle(
                &HandlerContext::from_client(),
                "client-1",
                EventType::Health,
                b"not-json",
                "req-1",
            )
            .await;

        assert!(matches!(result, Err(HubError::MalformedPayload(_))));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_messages_and_hub_origin_are_ignored() {
        let (service, recorder) = service();

        service
            .handle(
                &HandlerContext::from_client(),
                "client-1",
                EventType::Health,
                br#"{"message":"status"}"#,
                "req-1",
            )
            .await
            .unwrap();
        service
            .handle(
                &HandlerContext::from_hub(),
                "",
                EventType::Health,
                br#"{"message":"ping"}"#,
                "req-2",
            )
            .await
            .unwrap();

        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ping_under_another_event_type_gets_no_pong() {
        let (service, recorder) = service();

        service
            .handle(
                &HandlerContext::from_client(),
                "client-1",
                EventType::System,
                br#"{"message":"ping"}"#,
                "req-1",
            )
            .await
            .unwrap();

        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
