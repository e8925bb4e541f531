//! Core of the streamgate service
//!
//! Two independent halves live here:
//! - [`auth`]: bearer-token verification against a [`TrustAnchor`], scope
//!   evaluation, and the request-level [`AuthGate`].
//! - [`sessions`]: the [`SessionRegistry`] of live push-event streams and the
//!   per-session [`SessionController`] that drives heartbeats and expiry.
//!
//! Nothing in this crate knows about a particular HTTP framework; the
//! `streamgate` crate adapts these types to axum.

pub mod auth;
pub mod error;
pub mod sessions;

pub use auth::{
    AuthGate, Claims, GateMode, Identity, JwtVerifier, NumericDate, Rejection, Scoped, TokenVerifier,
    TrustAnchor, has_any_scope, has_scope, verify,
};
pub use error::{AuthError, AuthErrorKind, SessionError};
pub use sessions::{
    BroadcastReport, ChannelSink, CloseReason, EventSink, LifecycleConfig, Session,
    SessionController, SessionRegistry, SessionState,
};

#[cfg(test)]
pub(crate) mod test_support;
