use async_trait::async_trait;
use axum::{
    extract::{ws::WebSocket, ConnectInfo, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::event::{parse_event_types, EventMessage, EventType};
use crate::hub::{
    Broadcaster, ClientRegistration, ClientSpec, EmitterStats, EventHub, HubError, Subscription,
};
use crate::shared::{AppError, AppState};

use super::messages::{
    ConnectQuery, InboundFrame, UnsubscribeRequest, UnsubscribeResponse, WelcomeBody,
};
use super::socket::{Connection, FrameHandler};

/// Routes frames received from a client into the hub's handlers
pub struct HubFrameHandler {
    hub: Arc<EventHub>,
}

impl HubFrameHandler {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl FrameHandler for HubFrameHandler {
    async fn handle_frame(&self, client_id: &str, frame: String) {
        let inbound = match serde_json::from_str::<InboundFrame>(&frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(
                    client_id = %client_id,
                    error = %e,
                    "Failed to parse WebSocket frame"
                );
                return;
            }
        };

        let message_id = inbound
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(crate::event::generate_id);

        debug!(
            client_id = %client_id,
            event_type = %inbound.event_type,
            message_id = %message_id,
            "Received client event"
        );

        self.hub
            .deliver(client_id, inbound.event_type, frame.as_bytes(), &message_id)
            .await;
    }
}

/// Resolves the subscription requested in the query string
///
/// No `event_types` means `global` only; `all` means every type.
pub fn subscription_from_query(query: &ConnectQuery) -> Result<Subscription, AppError> {
    let raw = match query.event_types.as_deref().map(str::trim) {
        None | Some("") => return Ok(Subscription::global_only()),
        Some(raw) => raw,
    };

    if raw.eq_ignore_ascii_case("all") {
        return Ok(Subscription::All);
    }

    let names: Vec<&str> = raw.split(',').collect();
    let types = parse_event_types(&names).into_result()?;
    Ok(Subscription::types(types))
}

/// Best guess at the caller's address, honouring reverse proxy headers
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

/// WebSocket endpoint
/// GET /events/ws?event_types=vm,host
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let subscription = subscription_from_query(&query)?;
    let remote_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    info!(
        remote_ip = ?remote_ip,
        event_types = ?query.event_types,
        "WebSocket connection requested"
    );

    if let Some(ip) = remote_ip.as_deref() {
        ensure_ip_available(&app_state, ip).await?;
    }

    let mut spec = ClientSpec::new(subscription);
    if let Some(ip) = remote_ip {
        spec = spec.with_remote_ip(ip);
    }

    Ok(ws
        .max_message_size(app_state.config.max_message_size)
        .on_upgrade(move |socket| handle_websocket_connection(socket, spec, app_state)))
}

/// Fails with a conflict when `ip` already holds a connection and the
/// configuration allows only one per address
pub async fn ensure_ip_available(app_state: &AppState, ip: &str) -> Result<(), AppError> {
    if app_state.config.allow_multiple_connections_per_ip {
        return Ok(());
    }
    if app_state
        .hub
        .clients()
        .has_active_connection_from_ip(ip)
        .await
    {
        warn!(remote_ip = %ip, "Rejecting second connection from the same IP");
        return Err(HubError::ConnectionLimit(ip.to_string()).into());
    }
    Ok(())
}

/// Registers a client and queues its welcome message
///
/// The per-IP limit is enforced again at registration, so a connection that
/// raced past `ensure_ip_available` is still refused.
pub async fn admit_client(
    app_state: &AppState,
    spec: ClientSpec,
) -> Result<ClientRegistration, AppError> {
    let spec = spec.with_exclusive_ip(!app_state.config.allow_multiple_connections_per_ip);
    let registration = app_state.hub.clients().register(spec).await?;

    info!(
        client_id = %registration.client_id,
        subscriptions = ?registration.subscriptions,
        "WebSocket connection established"
    );

    let body = serde_json::to_value(WelcomeBody {
        client_id: registration.client_id.clone(),
        subscriptions: registration.subscriptions.clone(),
    })
    .unwrap_or_default();
    let welcome = EventMessage::new(EventType::Global, "WebSocket connection established", body)
        .to_client(registration.client_id.clone());
    if let Err(e) = app_state.hub.broadcast_message(welcome).await {
        warn!(client_id = %registration.client_id, error = %e, "Failed to send welcome message");
    }

    Ok(registration)
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(socket: WebSocket, spec: ClientSpec, app_state: AppState) {
    let ClientRegistration {
        client_id,
        receiver,
        ..
    } = match admit_client(&app_state, spec).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(error = %e, "Failed to register WebSocket client");
            return;
        }
    };

    let frame_handler = Arc::new(HubFrameHandler::new(Arc::clone(&app_state.hub)));
    let connection = Connection::new(
        client_id.clone(),
        Box::new(socket),
        receiver,
        frame_handler,
        app_state.config.connection_settings(),
    );

    // Run the connection until disconnect
    match connection.run().await {
        Ok(()) => {
            info!(client_id = %client_id, "WebSocket connection closed cleanly");
        }
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "WebSocket connection error");
        }
    }

    // A hub shutdown may already have removed the client
    app_state.hub.clients().unregister(&client_id).await;
}

/// GET /events/stats
pub async fn stats_handler(State(app_state): State<AppState>) -> Json<EmitterStats> {
    Json(app_state.hub.clients().snapshot().await)
}

/// POST /events/unsubscribe
pub async fn unsubscribe_handler(
    State(app_state): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, AppError> {
    if request.client_id.trim().is_empty() {
        return Err(AppError::BadRequest("client_id is required".to_string()));
    }

    let event_types = parse_event_types(&request.event_types).into_result()?;
    let outcome = app_state
        .hub
        .clients()
        .unsubscribe(&request.client_id, &event_types)
        .await?;

    if outcome.removed.is_empty() && !outcome.rejected.is_empty() {
        return Err(AppError::BadRequest(
            "cannot unsubscribe from global event type".to_string(),
        ));
    }

    Ok(Json(UnsubscribeResponse {
        client_id: request.client_id,
        outcome,
    }))
}
