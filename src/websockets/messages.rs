use serde::{Deserialize, Serialize};

use crate::event::EventType;
use crate::hub::UnsubscribeOutcome;

/// Envelope every inbound frame must carry
///
/// The remaining fields are handler-specific and are left in the raw frame,
/// which is what handlers receive as payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: EventType,
}

/// Query string of the upgrade request, e.g. `?event_types=vm,host`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub event_types: Option<String>,
}

/// Body of the welcome message sent right after the upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeBody {
    pub client_id: String,
    pub subscriptions: Vec<EventType>,
}

/// `POST /events/unsubscribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub client_id: String,
    pub event_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub client_id: String,
    #[serde(flatten)]
    pub outcome: UnsubscribeOutcome,
}
