//! Authentication and authorization
//!
//! - [`TrustAnchor`]: verification key, issuer base URL and application id
//! - [`verify`] / [`JwtVerifier`]: RS256 signature, issuer, expiry and
//!   audience checks producing [`Claims`]
//! - [`has_scope`] / [`has_any_scope`]: scope evaluation with the
//!   `{app_id}.` qualified form
//! - [`AuthGate`]: per-request credential extraction and rejection policy

mod anchor;
mod claims;
mod gate;
mod scope;
mod verifier;

pub use anchor::{TrustAnchor, normalize_public_key};
pub use claims::{Claims, Identity, NumericDate, Scoped};
pub use gate::{AuthGate, EXPECTED_HEADER_FORM, GateMode, Rejection, RejectionBody, extract_bearer};
pub use scope::{has_any_scope, has_scope};
pub use verifier::{CLOCK_SKEW_LEEWAY_SECS, JwtVerifier, SIGNING_ALGORITHM, TokenVerifier, verify};
