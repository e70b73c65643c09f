// Event model and in-process dispatch
//
// This module holds the closed set of event types, the message envelope that
// travels through the hub, and the registry that routes inbound events to
// server-side handlers.

// Public API - what other modules can use
pub use handler::{DeliveryOrigin, HandlerContext, MessageHandler};
pub use message::EventMessage;
pub(crate) use message::generate_id;
pub use registry::{DispatchReport, HandlerRegistry, DEFAULT_HANDLER_TIMEOUT};
pub use types::{parse_event_types, EventType, ParsedEventTypes};

// Internal modules
mod handler;
mod message;
mod registry;
mod types;
