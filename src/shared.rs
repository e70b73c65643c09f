use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::HubConfig;
use crate::hub::{EventHub, HubError};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<EventHub>,
    pub config: Arc<HubConfig>,
}

impl AppState {
    pub fn new(hub: Arc<EventHub>, config: Arc<HubConfig>) -> Self {
        Self { hub, config }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal,
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Validation(msg) => AppError::BadRequest(msg),
            HubError::MalformedPayload(msg) => AppError::BadRequest(msg),
            HubError::ClientNotFound(id) => AppError::NotFound(format!("client {} not found", id)),
            HubError::DuplicateClient(id) => {
                AppError::Conflict(format!("client {} already registered", id))
            }
            HubError::ConnectionLimit(ip) => AppError::Conflict(format!(
                "Only one connection allowed per IP address: {}",
                ip
            )),
            HubError::Delivery { .. } | HubError::HandlerFault { .. } => AppError::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_errors_map_to_status_codes() {
        let cases = [
            (HubError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (HubError::ClientNotFound("c1".into()), StatusCode::NOT_FOUND),
            (HubError::DuplicateClient("c1".into()), StatusCode::CONFLICT),
            (HubError::ConnectionLimit("10.0.0.1".into()), StatusCode::CONFLICT),
            (
                HubError::HandlerFault {
                    handler: "h".into(),
                    reason: "boom".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
