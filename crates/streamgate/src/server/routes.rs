use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use streamgate_core::sessions::is_valid_event_name;
use streamgate_core::{BroadcastReport, Identity};

use super::AppState;
use super::error::ApiError;

/// Body of an addressed send or a broadcast
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if is_valid_event_name(&self.event) {
            Ok(())
        } else {
            Err(ApiError::BadRequest(
                "event must be a non-empty name without line breaks".to_string(),
            ))
        }
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.count(),
        "auth": state.gate.is_enabled(),
    }))
}

/// GET /me
pub async fn me(identity: Option<Extension<Identity>>) -> Json<Value> {
    let identity = identity.map(|Extension(identity)| identity);
    Json(json!({
        "authenticated": identity.is_some(),
        "identity": identity,
    }))
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let mut ids = state.registry.list_ids();
    ids.sort();
    Json(json!({
        "count": ids.len(),
        "sessionIds": ids,
    }))
}

/// POST /sessions/{id}/events
pub async fn send_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EventRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    request.validate()?;

    if state.registry.send_to(&id, &request.event, &request.data).await {
        Ok((StatusCode::ACCEPTED, Json(json!({ "delivered": true }))))
    } else {
        Err(ApiError::NotFound(format!("no open session '{id}'")))
    }
}

/// POST /broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Result<Json<BroadcastReport>, ApiError> {
    request.validate()?;
    Ok(Json(state.registry.broadcast(&request.event, &request.data).await))
}

/// DELETE /sessions/{id}
pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.disconnect(&id) {
        tracing::info!(session_id = %id, "Session disconnected by administrator");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no open session '{id}'")))
    }
}
