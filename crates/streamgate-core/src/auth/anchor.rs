use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Prefix the service broker puts in front of the application id when it
/// issues tokens on behalf of a bound service instance.
const SERVICE_BROKER_PREFIX: &str = "sb-";

/// PEM line width
const PEM_LINE_WIDTH: usize = 64;

/// Everything needed to decide whether a token was issued for us.
///
/// Loaded once at start-up and shared read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Base URL of the authorization server; the expected issuer is
    /// `{url}/oauth/token`.
    pub url: String,

    /// Application identifier tokens must be addressed to
    pub app_id: String,

    /// RSA public key, either PEM or a bare base64 body
    #[serde(default)]
    pub verification_key: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,
}

impl TrustAnchor {
    pub fn new(url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            app_id: app_id.into(),
            verification_key: None,
            client_id: None,
        }
    }

    pub fn with_verification_key(mut self, key: impl Into<String>) -> Self {
        self.verification_key = Some(key.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn expected_issuer(&self) -> String {
        format!("{}/oauth/token", self.url.trim_end_matches('/'))
    }

    /// `sb-{app_id}`
    pub fn broker_audience(&self) -> String {
        format!("{SERVICE_BROKER_PREFIX}{}", self.app_id)
    }

    /// Whether a single `aud` value is addressed to this application.
    ///
    /// Accepts the bare id, the service-broker form, and any value that
    /// starts with the id.
    pub fn accepts_audience(&self, audience: &str) -> bool {
        if self.app_id.is_empty() {
            return false;
        }
        audience == self.app_id
            || audience == self.broker_audience()
            || audience.starts_with(&self.app_id)
    }

    /// Build the RS256 decoding key from the configured key material.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        let pem = self
            .verification_key
            .as_deref()
            .and_then(normalize_public_key)
            .ok_or(AuthError::MissingKey)?;

        DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            tracing::warn!(error = %e, "configured verification key is not a usable RSA public key");
            AuthError::MissingKey
        })
    }
}

/// Normalize verification key material into a PEM document.
///
/// Handles the shapes key material arrives in from service bindings:
/// literal `\n` escapes, PEM collapsed onto one line, and a bare base64
/// body with no armor at all. Returns `None` for empty input.
pub fn normalize_public_key(raw: &str) -> Option<String> {
    let unescaped = raw.trim().replace("\\n", "\n");
    if unescaped.is_empty() {
        return None;
    }

    let (label, body) = match unescaped.find("-----BEGIN ") {
        Some(start) => {
            let rest = &unescaped[start + "-----BEGIN ".len()..];
            let label_end = rest.find("-----")?;
            let label = &rest[..label_end];
            let after_header = &rest[label_end + "-----".len()..];
            let footer = format!("-----END {label}-----");
            let body_end = after_header.find(&footer)?;
            (label.to_string(), &after_header[..body_end])
        }
        None => ("PUBLIC KEY".to_string(), unescaped.as_str()),
    };

    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if body.is_empty() {
        return None;
    }

    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        // base64 is ASCII, so chunking on bytes never splits a character
        pem.push_str(std::str::from_utf8(line).ok()?);
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));

    Some(pem)
}
