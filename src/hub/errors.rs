use thiserror::Error;

/// Errors raised inside the hub
///
/// Only `Validation` ever reaches a producer calling `broadcast_message`.
/// The other variants are logged and counted where they happen.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Delivery to client {client_id} failed: {reason}")]
    Delivery { client_id: String, reason: String },

    #[error("Handler {handler} failed: {reason}")]
    HandlerFault { handler: String, reason: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("Client already registered: {0}")]
    DuplicateClient(String),

    #[error("Only one connection allowed per IP: {0}")]
    ConnectionLimit(String),
}
