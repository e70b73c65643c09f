use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::shared::AppState;

use super::handler::{stats_handler, unsubscribe_handler, websocket_handler};

/// HTTP surface of the hub
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/events/ws", get(websocket_handler))
        .route("/events/stats", get(stats_handler))
        .route("/events/unsubscribe", post(unsubscribe_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
