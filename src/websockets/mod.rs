// Public API
pub use handler::{
    admit_client, client_ip, ensure_ip_available, stats_handler, subscription_from_query,
    unsubscribe_handler, websocket_handler, HubFrameHandler,
};
pub use messages::{
    ConnectQuery, InboundFrame, UnsubscribeRequest, UnsubscribeResponse, WelcomeBody,
};
pub use routes::router;
pub use socket::{Connection, ConnectionSettings, FrameHandler, Inbound, SocketError, SocketWrapper};

// Internal modules
mod handler;
mod messages;
mod routes;
mod socket;
