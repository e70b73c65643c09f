// Library crate for the event hub
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod event;
pub mod hub;
pub mod logging;
pub mod services;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use config::HubConfig;
pub use event::{EventMessage, EventType, HandlerContext, MessageHandler};
pub use hub::{Broadcaster, EventHub, HubError, Registrar};
pub use logging::{LogEntry, LogStream};
pub use services::{HealthService, LogService, StatsService, SystemService};
pub use shared::{AppError, AppState};
