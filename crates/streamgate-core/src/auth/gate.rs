//! Request-level authentication and authorization decisions
//!
//! Framework-agnostic: callers hand in the raw `Authorization` header value
//! and get back either an [`Identity`] or a [`Rejection`] describing the
//! HTTP response to send.

use serde::Serialize;
use std::sync::Arc;

use super::anchor::TrustAnchor;
use super::claims::Identity;
use super::scope::has_any_scope;
use super::verifier::{JwtVerifier, TokenVerifier};

/// Header form quoted back to callers that present no usable credential
pub const EXPECTED_HEADER_FORM: &str = "Authorization: Bearer <token>";

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly two parts separated by a single space, the
/// first being `Bearer` in any case, the second non-empty.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let header = header?;
    let mut parts = header.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// How the gate treats a request without a valid credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Reject with 401
    Required,
    /// Continue without an identity
    Optional,
}

/// JSON body of a 401 or 403 response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionBody {
    pub error: String,
    pub message: String,
    #[serde(rename = "userScopes", skip_serializing_if = "Option::is_none")]
    pub user_scopes: Option<Vec<String>>,
}

/// A refused request: status code plus the body to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub body: RejectionBody,
}

impl Rejection {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: 401,
            body: RejectionBody {
                error: "Unauthorized".to_string(),
                message: message.into(),
                user_scopes: None,
            },
        }
    }

    pub fn forbidden(message: impl Into<String>, user_scopes: Vec<String>) -> Self {
        Self {
            status: 403,
            body: RejectionBody {
                error: "Forbidden".to_string(),
                message: message.into(),
                user_scopes: Some(user_scopes),
            },
        }
    }
}

/// Gatekeeper shared by every protected route.
///
/// A gate without a verifier has authentication disabled and lets every
/// request through without an identity.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Option<Arc<dyn TokenVerifier>>,
    app_id: String,
}

impl AuthGate {
    /// Gate backed by [`JwtVerifier`], disabled when `anchor` is `None`.
    pub fn new(anchor: Option<Arc<TrustAnchor>>) -> Self {
        match anchor {
            Some(anchor) => {
                let app_id = anchor.app_id.clone();
                Self::with_verifier(Arc::new(JwtVerifier::new(anchor)), app_id)
            }
            None => Self::disabled(),
        }
    }

    pub fn with_verifier(verifier: Arc<dyn TokenVerifier>, app_id: impl Into<String>) -> Self {
        Self {
            verifier: Some(verifier),
            app_id: app_id.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            verifier: None,
            app_id: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Resolve the caller identity from an `Authorization` header value.
    ///
    /// `Ok(None)` means continue without an identity: the gate is disabled,
    /// or the mode is [`GateMode::Optional`] and no valid credential was
    /// presented.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        mode: GateMode,
    ) -> Result<Option<Identity>, Rejection> {
        let Some(verifier) = &self.verifier else {
            return Ok(None);
        };

        let Some(token) = extract_bearer(authorization) else {
            return match mode {
                GateMode::Optional => Ok(None),
                GateMode::Required => {
                    tracing::warn!(reason = "missing credential", "Rejecting unauthenticated request");
                    Err(Rejection::unauthorized(format!(
                        "Missing or malformed credential; expected '{EXPECTED_HEADER_FORM}'"
                    )))
                }
            };
        };

        match verifier.verify(token) {
            Ok(claims) => {
                let identity = Identity::from(&claims);
                tracing::info!(
                    client_id = %identity.client_id,
                    grant_type = %identity.grant_type,
                    "Authenticated request"
                );
                Ok(Some(identity))
            }
            Err(err) => match mode {
                GateMode::Optional => {
                    tracing::debug!(kind = ?err.kind(), "Ignoring invalid optional credential");
                    Ok(None)
                }
                GateMode::Required => {
                    tracing::warn!(kind = ?err.kind(), reason = %err, "Rejecting unauthenticated request");
                    Err(Rejection::unauthorized(err.to_string()))
                }
            },
        }
    }

    /// Check that `identity` holds at least one of `required`.
    pub fn authorize(&self, identity: Option<&Identity>, required: &[String]) -> Result<(), Rejection> {
        if !self.is_enabled() {
            return Ok(());
        }

        let Some(identity) = identity else {
            tracing::warn!(reason = "no identity on scoped route", "Rejecting unauthenticated request");
            return Err(Rejection::unauthorized("Authentication required"));
        };

        if has_any_scope(identity, required, &self.app_id) {
            return Ok(());
        }

        let acceptable: Vec<String> = required
            .iter()
            .flat_map(|scope| [scope.clone(), format!("{}.{scope}", self.app_id)])
            .collect();
        tracing::warn!(
            required = ?acceptable,
            granted = ?identity.scopes,
            user_id = %identity.user_id,
            "Rejecting request with insufficient scope"
        );
        Err(Rejection::forbidden(
            format!("Insufficient scope; requires one of: {}", acceptable.join(", ")),
            identity.scopes.clone(),
        ))
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("enabled", &self.is_enabled())
            .field("app_id", &self.app_id)
            .finish()
    }
}
