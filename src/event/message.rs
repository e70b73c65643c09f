use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::types::EventType;
use crate::hub::HubError;

/// Envelope for everything that flows through the hub
///
/// `client_id` turns a message into a unicast for one connected client;
/// without it the message is routed by subscription. `ref_id` links a reply
/// to the request it answers. The hub never checks it against anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

impl EventMessage {
    /// Creates a message with a fresh id and the current UTC time
    pub fn new(event_type: EventType, message: impl Into<String>, body: Value) -> Self {
        Self {
            id: generate_id(),
            event_type,
            timestamp: Utc::now(),
            message: message.into(),
            body,
            client_id: None,
            ref_id: None,
        }
    }

    /// Targets a single client instead of the type's subscribers
    pub fn to_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Marks this message as the reply to `message_id`
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.ref_id = Some(message_id.into());
        self
    }

    pub fn is_unicast(&self) -> bool {
        self.client_id.is_some()
    }

    /// Same type, label and body, whatever the id and timestamp
    pub fn is_equivalent(&self, other: &EventMessage) -> bool {
        self.event_type == other.event_type
            && self.message == other.message
            && self.body == other.body
    }

    /// Rejects messages whose optional identifiers are present but blank
    pub fn validate(&self) -> Result<(), HubError> {
        if !EventType::is_valid(self.event_type.as_ref()) {
            return Err(HubError::Validation(format!(
                "unknown event type {}",
                self.event_type
            )));
        }

        if matches!(&self.client_id, Some(id) if id.trim().is_empty()) {
            return Err(HubError::Validation(
                "client_id must not be blank when set".to_string(),
            ));
        }

        if matches!(&self.ref_id, Some(id) if id.trim().is_empty()) {
            return Err(HubError::Validation(
                "ref_id must not be blank when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Fills in the id and timestamp when the producer left them unset
    pub fn ensure_identity(&mut self) {
        if self.id.trim().is_empty() {
            self.id = generate_id();
        }
        if self.timestamp == DateTime::<Utc>::default() {
            self.timestamp = Utc::now();
        }
    }
}

pub(crate) fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_new_message_has_identity_and_no_routing() {
        let before = Utc::now();
        let msg = EventMessage::new(
            EventType::Pdfm,
            "Test message",
            json!({"key1": "value1", "key2": 123}),
        );

        assert!(!msg.id.is_empty());
        assert_eq!(msg.event_type, EventType::Pdfm);
        assert_eq!(msg.message, "Test message");
        assert_eq!(msg.body, json!({"key1": "value1", "key2": 123}));
        assert!(msg.client_id.is_none());
        assert!(msg.ref_id.is_none());
        assert!(msg.timestamp >= before);
        assert!(msg.timestamp <= Utc::now());
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<String> = (0..1000)
            .map(|i| EventMessage::new(EventType::Vm, format!("msg {}", i), Value::Null).id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_equivalence_ignores_identity() {
        let a = EventMessage::new(EventType::Health, "pong", json!("pong"));
        let b = EventMessage::new(EventType::Health, "pong", json!("pong"));
        assert_ne!(a.id, b.id);
        assert!(a.is_equivalent(&b));

        let c = EventMessage::new(EventType::Health, "ping", json!("pong"));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_reply_builders_set_routing_fields() {
        let reply = EventMessage::new(EventType::Health, "pong", Value::Null)
            .to_client("client-1")
            .in_reply_to("msg-1");
        assert!(reply.is_unicast());
        assert_eq!(reply.client_id.as_deref(), Some("client-1"));
        assert_eq!(reply.ref_id.as_deref(), Some("msg-1"));
        assert!(reply.validate().is_ok());
    }

    #[test]
    fn test_blank_routing_fields_fail_validation() {
        let blank_client = EventMessage::new(EventType::Vm, "x", Value::Null).to_client("  ");
        assert!(matches!(
            blank_client.validate(),
            Err(HubError::Validation(_))
        ));

        let blank_ref = EventMessage::new(EventType::Vm, "x", Value::Null).in_reply_to("");
        assert!(matches!(blank_ref.validate(), Err(HubError::Validation(_))));
    }

    #[test]
    fn test_ensure_identity_fills_only_missing_fields() {
        let mut bare = EventMessage {
            event_type: EventType::Host,
            message: "host up".to_string(),
            ..Default::default()
        };
        assert!(bare.id.is_empty());
        bare.ensure_identity();
        assert!(!bare.id.is_empty());
        assert_ne!(bare.timestamp, DateTime::<Utc>::default());

        let mut stamped = EventMessage::new(EventType::Host, "host up", Value::Null);
        let original = stamped.clone();
        stamped.ensure_identity();
        assert_eq!(stamped, original);
    }

    #[test]
    fn test_wire_shape() {
        let msg = EventMessage::new(EventType::Health, "pong", json!("pong"))
            .to_client("client-1")
            .in_reply_to("req-1");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["event_type"], "health");
        assert_eq!(value["message"], "pong");
        assert_eq!(value["body"], "pong");
        assert_eq!(value["client_id"], "client-1");
        assert_eq!(value["ref_id"], "req-1");
        assert!(value["timestamp"].as_str().is_some());

        let broadcast = EventMessage::new(EventType::Vm, "vm started", Value::Null);
        let value = serde_json::to_value(&broadcast).unwrap();
        assert!(value.get("client_id").is_none());
        assert!(value.get("ref_id").is_none());
        assert!(value.get("body").is_none());
    }
}
