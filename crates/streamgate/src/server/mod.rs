//! HTTP surface
//!
//! | Route | Gate |
//! |-------|------|
//! | `GET /health` | none |
//! | `GET /me` | required |
//! | `GET /events` | optional |
//! | `GET /sessions`, `DELETE /sessions/{id}`, `POST /sessions/{id}/events`, `POST /broadcast` | required + `admin` scope |

mod error;
mod events;
mod middleware;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use std::sync::Arc;
use streamgate_core::{AuthGate, LifecycleConfig, SessionRegistry};
use tokio::net::TcpListener;

use crate::config::ServerConfig;

pub use error::{ApiError, ApiRejection};
pub use events::{PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER};
pub use middleware::{ScopeGuard, optional_auth, require_auth, require_scopes};
pub use routes::EventRequest;

/// Scope required by the session administration routes
pub const ADMIN_SCOPE: &str = "admin";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub gate: AuthGate,
    pub registry: SessionRegistry,
    pub lifecycle: LifecycleConfig,
    pub protocol_version: String,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            gate: AuthGate::new(config.trust_anchor.clone().map(Arc::new)),
            registry: SessionRegistry::with_write_timeout(config.write_timeout),
            lifecycle: config.lifecycle,
            protocol_version: config.protocol_version.clone(),
        }
    }
}

/// Build the router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    // The last route_layer added runs first: authenticate, then check scope
    let admin = Router::new()
        .route("/sessions", get(routes::list_sessions))
        .route("/sessions/{id}", delete(routes::disconnect_session))
        .route("/sessions/{id}/events", post(routes::send_event))
        .route("/broadcast", post(routes::broadcast))
        .route_layer(from_fn_with_state(
            ScopeGuard::new(state.gate.clone(), [ADMIN_SCOPE]),
            require_scopes,
        ))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let authenticated = Router::new()
        .route("/me", get(routes::me))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let streaming = Router::new()
        .route("/events", get(events::open_stream))
        .route_layer(from_fn_with_state(state.clone(), optional_auth));

    Router::new()
        .route("/health", get(routes::health))
        .merge(admin)
        .merge(authenticated)
        .merge(streaming)
        .with_state(state)
}

/// Bind, serve until Ctrl-C, then close every open stream.
pub async fn serve(config: ServerConfig) -> Result<()> {
    log_auth_mode(&config);

    let state = AppState::from_config(&config);
    let registry = state.registry.clone();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let addr = listener.local_addr().context("Failed to read local address")?;

    tracing::info!(
        %addr,
        heartbeat_secs = config.lifecycle.heartbeat_interval.as_secs(),
        session_ttl_secs = config.lifecycle.max_lifetime.as_secs(),
        "streamgate listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("HTTP server error")?;

    tracing::info!("streamgate stopped");
    Ok(())
}

fn log_auth_mode(config: &ServerConfig) {
    match (&config.trust_anchor, config.auth_enabled) {
        (_, false) => tracing::warn!("Authentication disabled by STREAMGATE_AUTH_ENABLED"),
        (None, true) => tracing::warn!(
            "No XSUAA configuration found (XSUAA_URL / VCAP_SERVICES); running with authentication disabled"
        ),
        (Some(anchor), true) => {
            tracing::info!(
                issuer = %anchor.expected_issuer(),
                app_id = %anchor.app_id,
                "Authentication enabled"
            );
            if anchor.decoding_key().is_err() {
                tracing::warn!("No usable verification key configured; every credential will be rejected");
            }
        }
    }
}

async fn shutdown_signal(registry: SessionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!(sessions = registry.count(), "Shutdown signal received");
    // Open streams would otherwise hold graceful shutdown forever
    registry.disconnect_all();
}
