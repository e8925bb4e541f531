//! JWT token verification

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use std::sync::Arc;

use super::anchor::TrustAnchor;
use super::claims::{Claims, NumericDate};
use crate::error::AuthError;

/// The only algorithm tokens are verified with. The `alg` in a token
/// header is never consulted.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Clock skew tolerance applied to `exp`, `nbf` and `iat`
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 30;

/// Verifies a bearer credential and returns its claims.
///
/// Implementations must not hold shared mutable state; the gate calls
/// them concurrently from every request.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Verify `token` against `anchor`.
pub fn verify(token: &str, anchor: &TrustAnchor) -> Result<Claims, AuthError> {
    let key = anchor.decoding_key()?;
    verify_with_key(token, &key, anchor)
}

fn verify_with_key(
    token: &str,
    key: &DecodingKey,
    anchor: &TrustAnchor,
) -> Result<Claims, AuthError> {
    let expected_issuer = anchor.expected_issuer();

    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.set_issuer(&[expected_issuer.as_str()]);
    validation.set_required_spec_claims(&["exp", "iss"]);
    validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
    validation.validate_nbf = true;
    // Audience matching is broader than exact equality, see check_audience
    validation.validate_aud = false;

    let claims = decode::<Claims>(token, key, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidIssuer => AuthError::VerificationFailed(format!(
                "issuer does not match '{expected_issuer}'"
            )),
            _ => AuthError::from(e),
        })?
        .claims;

    check_issued_at(&claims)?;
    check_audience(&claims, anchor)?;

    Ok(claims)
}

fn check_issued_at(claims: &Claims) -> Result<(), AuthError> {
    let now = chrono::Utc::now().timestamp();
    match claims.iat.map(NumericDate::timestamp) {
        Some(iat) if iat > now + CLOCK_SKEW_LEEWAY_SECS as i64 => Err(
            AuthError::VerificationFailed("token issued in the future".to_string()),
        ),
        _ => Ok(()),
    }
}

fn check_audience(claims: &Claims, anchor: &TrustAnchor) -> Result<(), AuthError> {
    if claims.aud.iter().any(|aud| anchor.accepts_audience(aud)) {
        return Ok(());
    }
    Err(AuthError::InvalidAudience {
        app_id: anchor.app_id.clone(),
        broker_id: anchor.broker_audience(),
    })
}

/// [`TokenVerifier`] bound to one [`TrustAnchor`].
///
/// The decoding key is derived once at construction; a verifier built from
/// an anchor without usable key material rejects every token with
/// [`AuthError::MissingKey`].
#[derive(Clone)]
pub struct JwtVerifier {
    anchor: Arc<TrustAnchor>,
    key: Option<DecodingKey>,
}

impl JwtVerifier {
    pub fn new(anchor: Arc<TrustAnchor>) -> Self {
        let key = anchor.decoding_key().ok();
        Self { anchor, key }
    }

    pub fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let key = self.key.as_ref().ok_or(AuthError::MissingKey)?;
        verify_with_key(token, key, &self.anchor)
    }
}
