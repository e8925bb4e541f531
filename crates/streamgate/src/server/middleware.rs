//! axum adapters for [`AuthGate`]
//!
//! - [`require_auth`]: 401 without a valid credential
//! - [`optional_auth`]: attaches an identity when one is presented
//! - [`require_scopes`]: 403 unless the identity holds one of the guard's
//!   scopes; must run after [`require_auth`]
//!
//! The resolved [`Identity`] is stored in the request extensions.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use streamgate_core::{AuthGate, GateMode, Identity};

use super::AppState;
use super::error::ApiRejection;

fn authenticate(gate: &AuthGate, request: &mut Request, mode: GateMode) -> Result<(), ApiRejection> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Some(identity) = gate.authenticate(authorization, mode)? {
        request.extensions_mut().insert(identity);
    }
    Ok(())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiRejection> {
    authenticate(&state.gate, &mut request, GateMode::Required)?;
    Ok(next.run(request).await)
}

pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiRejection> {
    authenticate(&state.gate, &mut request, GateMode::Optional)?;
    Ok(next.run(request).await)
}

/// Scopes a route group requires, any one of which suffices
#[derive(Clone)]
pub struct ScopeGuard {
    gate: AuthGate,
    scopes: Arc<[String]>,
}

impl ScopeGuard {
    pub fn new<I, S>(gate: AuthGate, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gate,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

pub async fn require_scopes(
    State(guard): State<ScopeGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiRejection> {
    guard
        .gate
        .authorize(request.extensions().get::<Identity>(), &guard.scopes)?;
    Ok(next.run(request).await)
}
