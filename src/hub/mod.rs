// Broadcast hub
//
// Ties the handler registry and the client registry together behind the two
// capability traits that the rest of the service depends on.

// Public API - what other modules can use
pub use broadcast::EventHub;
pub use capabilities::{Broadcaster, Registrar};
pub use clients::{
    ClientRegistration, ClientRegistry, ClientSpec, Subscription, DEFAULT_CLIENT_QUEUE_CAPACITY,
    MAX_CLIENT_QUEUE_CAPACITY,
};
pub use errors::HubError;
pub use models::{ClientInfo, DeliveryReport, EmitterStats, UnsubscribeOutcome};

// Internal modules
mod broadcast;
mod capabilities;
mod clients;
mod errors;
mod models;
