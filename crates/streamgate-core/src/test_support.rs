//! Fixtures shared by unit tests

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::TrustAnchor;
use crate::error::SessionError;
use crate::sessions::EventSink;

pub const TRUSTED_PRIVATE_PEM: &str = include_str!("../tests/fixtures/trusted_private.pem");
pub const TRUSTED_PUBLIC_PEM: &str = include_str!("../tests/fixtures/trusted_public.pem");
pub const ROGUE_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rogue_private.pem");

pub const ANCHOR_URL: &str = "https://tenant.auth.example.com";
pub const APP_ID: &str = "myapp";

pub fn anchor() -> TrustAnchor {
    TrustAnchor::new(ANCHOR_URL, APP_ID).with_verification_key(TRUSTED_PUBLIC_PEM)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A payload the anchor accepts; tests override individual members.
pub fn payload() -> Value {
    let now = now();
    json!({
        "sub": "user-1",
        "user_id": "user-1",
        "user_name": "jdoe",
        "email": "jdoe@example.com",
        "client_id": "sb-myapp!t1",
        "azp": "sb-myapp!t1",
        "scope": ["myapp.read"],
        "iss": format!("{ANCHOR_URL}/oauth/token"),
        "aud": ["sb-myapp"],
        "iat": now,
        "exp": now + 600,
        "zid": "zone-1",
        "grant_type": "authorization_code",
    })
}

pub fn payload_with(overrides: Value) -> Value {
    let mut base = payload();
    if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    base
}

pub fn sign_with(payload: &Value, private_pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), payload, &key).unwrap()
}

pub fn sign(payload: &Value) -> String {
    sign_with(payload, TRUSTED_PRIVATE_PEM)
}

/// Sink recording every frame. Writes past a configurable count fail or
/// never complete.
pub struct RecordingSink {
    mode: SinkMode,
    frames: Mutex<Vec<String>>,
    writes: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SinkMode {
    Healthy,
    FailAfter(usize),
    StallAfter(usize),
}

impl RecordingSink {
    fn with_mode(mode: SinkMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            frames: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::with_mode(SinkMode::Healthy)
    }

    pub fn failing() -> Arc<Self> {
        Self::failing_after(0)
    }

    pub fn failing_after(writes: usize) -> Arc<Self> {
        Self::with_mode(SinkMode::FailAfter(writes))
    }

    pub fn stalled() -> Arc<Self> {
        Self::stalled_after(0)
    }

    pub fn stalled_after(writes: usize) -> Arc<Self> {
        Self::with_mode(SinkMode::StallAfter(writes))
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn write(&self, frame: &str) -> Result<(), SessionError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SinkMode::FailAfter(limit) if n >= limit => {
                Err(SessionError::Transport("connection reset".to_string()))
            }
            SinkMode::StallAfter(limit) if n >= limit => std::future::pending().await,
            _ => {
                self.frames.lock().unwrap().push(frame.to_string());
                Ok(())
            }
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
